// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::error::FlashError;
use crate::flash::{BlockDevice, FlashBlockDevice, FlashGeometry};
use crate::interrupt::InterruptMask;
use crate::sim::{FlashCommand, SimulatedFlash, SimulatedInterrupts};
use std::vec::Vec;

const SIZE: u32 = 1024 * 1024;

fn geometry() -> FlashGeometry {
    FlashGeometry {
        controller_base: 0x1000_0000,
        data_start: 0x1000_0000,
        data_end: 0x1000_0000 + SIZE,
        write_block_size: 256,
        erase_block_size: 4096,
    }
}

type Device<'a> = FlashBlockDevice<SimulatedFlash<'a>, &'a SimulatedInterrupts>;

fn device(irq: &SimulatedInterrupts) -> Device<'_> {
    let g = geometry();
    let flash = SimulatedFlash::for_geometry(&g).observing(irq);
    FlashBlockDevice::new(flash, irq, g).unwrap()
}

#[test]
fn test_accessors() {
    let irq = SimulatedInterrupts::new();
    let dev = device(&irq);
    assert_eq!(dev.size(), SIZE);
    assert_eq!(dev.write_block_size(), 256);
    assert_eq!(dev.erase_block_size(), 4096);
    assert_eq!(*dev.geometry(), geometry());
}

#[test]
fn test_erase_first_block() {
    let irq = SimulatedInterrupts::new();
    let mut dev = device(&irq);

    dev.erase_blocks(0, 1).unwrap();

    assert_eq!(
        dev.controller().commands(),
        &[FlashCommand::Erase {
            address: 0,
            len: 4096,
            interrupts_enabled: Some(false),
        }]
    );
    assert!(irq.is_enabled());
}

#[test]
fn test_erase_last_block_and_range() {
    let irq = SimulatedInterrupts::new();
    let mut dev = device(&irq);

    dev.erase_blocks(255, 1).unwrap();
    dev.erase_blocks(2, 3).unwrap();

    let cmds = dev.controller().commands();
    assert_eq!(cmds.len(), 2);
    match &cmds[0] {
        FlashCommand::Erase { address, len, .. } => {
            assert_eq!(*address, 255 * 4096);
            assert_eq!(*len, 4096);
        }
        other => panic!("Expected Erase, got {:?}", other),
    }
    match &cmds[1] {
        FlashCommand::Erase { address, len, .. } => {
            assert_eq!(*address, 2 * 4096);
            assert_eq!(*len, 3 * 4096);
        }
        other => panic!("Expected Erase, got {:?}", other),
    }
}

#[test]
fn test_erase_past_end() {
    let irq = SimulatedInterrupts::new();
    let mut dev = device(&irq);

    match dev.erase_blocks(256, 1) {
        Err(FlashError::ErasePastEnd { first_block: 256, count: 1, size: SIZE }) => (),
        other => panic!("Expected ErasePastEnd, got {:?}", other),
    }
    match dev.erase_blocks(200, 100) {
        Err(e) => assert!(e.is_out_of_range()),
        Ok(_) => panic!("Expected ErasePastEnd"),
    }
    // Overflow in the block arithmetic still reports out of range.
    assert!(dev.erase_blocks(u32::MAX, u32::MAX).is_err());

    assert!(dev.controller().commands().is_empty());
    assert_eq!(irq.disable_count(), 0);
}

#[test]
fn test_erase_zero_blocks() {
    let irq = SimulatedInterrupts::new();
    let mut dev = device(&irq);
    dev.erase_blocks(256, 0).unwrap();
    assert!(dev.controller().commands().is_empty());
}

#[test]
fn test_write_is_padded() {
    let irq = SimulatedInterrupts::new();
    let mut dev = device(&irq);

    let written = dev.write_at(b"hi", 0).unwrap();
    assert_eq!(written, 256);

    let mut expected = b"hi".to_vec();
    expected.resize(256, 0xFF);
    assert_eq!(
        dev.controller().commands(),
        &[FlashCommand::Program {
            address: 0,
            data: expected,
            interrupts_enabled: Some(false),
        }]
    );
    assert!(irq.is_enabled());
}

#[test]
fn test_write_then_read_back() {
    let irq = SimulatedInterrupts::new();
    let mut dev = device(&irq);

    dev.write_at(b"wake", 512).unwrap();

    let mut buf = [0u8; 6];
    let n = dev.read_at(&mut buf, 512).unwrap();
    assert_eq!(n, 6);
    assert_eq!(&buf, b"wake\xFF\xFF");
    assert_eq!(dev.controller().cells(512, 4), b"wake");
}

#[test]
fn test_write_only_clears_bits() {
    let irq = SimulatedInterrupts::new();
    let mut dev = device(&irq);

    dev.write_at(&[0x0F], 0).unwrap();
    dev.write_at(&[0xF0], 0).unwrap();
    let mut buf = [0u8; 1];
    dev.read_at(&mut buf, 0).unwrap();
    assert_eq!(buf[0], 0x00);

    dev.erase_blocks(0, 1).unwrap();
    dev.read_at(&mut buf, 0).unwrap();
    assert_eq!(buf[0], 0xFF);
}

#[test]
fn test_write_to_offset_region() {
    let g = FlashGeometry {
        data_start: 0x1000_8000,
        data_end: 0x1001_0000,
        ..geometry()
    };
    let irq = SimulatedInterrupts::new();
    let flash = SimulatedFlash::for_geometry(&g);
    let mut dev = FlashBlockDevice::new(flash, &irq, g).unwrap();

    dev.write_at(&[1, 2, 3], 256).unwrap();
    match &dev.controller().commands()[0] {
        FlashCommand::Program { address, .. } => assert_eq!(*address, 0x8100),
        other => panic!("Expected Program, got {:?}", other),
    }
}

#[test]
fn test_write_boundary() {
    let irq = SimulatedInterrupts::new();
    let mut dev = device(&irq);
    let block = [0xA5u8; 256];

    assert_eq!(dev.write_at(&block, SIZE - 256).unwrap(), 256);
    assert_eq!(dev.controller().commands().len(), 1);

    let long = [0xA5u8; 257];
    match dev.write_at(&long, SIZE - 256) {
        Err(FlashError::WritePastEnd { offset, len: 257, size: SIZE }) => {
            assert_eq!(offset, SIZE - 256)
        }
        other => panic!("Expected WritePastEnd, got {:?}", other),
    }
    assert_eq!(dev.controller().commands().len(), 1);
}

#[test]
fn test_write_range_checks() {
    let irq = SimulatedInterrupts::new();
    let mut dev = device(&irq);

    match dev.write_at(&[0, 0], SIZE - 1) {
        Err(FlashError::WritePastEnd { .. }) => (),
        other => panic!("Expected WritePastEnd, got {:?}", other),
    }
    match dev.write_at(&[], SIZE + 256) {
        Err(FlashError::WritePastEnd { .. }) => (),
        other => panic!("Expected WritePastEnd, got {:?}", other),
    }
    assert!(dev.controller().commands().is_empty());
}

#[test]
fn test_unaligned_short_write() {
    let irq = SimulatedInterrupts::new();
    let mut dev = device(&irq);

    assert_eq!(dev.write_at(b"hi", 1).unwrap(), 256);

    let mut expected = vec![0xFF, b'h', b'i'];
    expected.resize(256, 0xFF);
    assert_eq!(
        dev.controller().commands(),
        &[FlashCommand::Program {
            address: 0,
            data: expected,
            interrupts_enabled: Some(false),
        }]
    );
}

#[test]
fn test_unaligned_write_ending_at_end() {
    let irq = SimulatedInterrupts::new();
    let mut dev = device(&irq);

    assert_eq!(dev.write_at(&[1, 2], SIZE - 2).unwrap(), 256);

    match &dev.controller().commands()[0] {
        FlashCommand::Program { address, data, .. } => {
            assert_eq!(*address, SIZE - 256);
            assert_eq!(data.len(), 256);
            assert!(data[..254].iter().all(|b| *b == 0xFF));
            assert_eq!(&data[254..], &[1, 2]);
        }
        other => panic!("Expected Program, got {:?}", other),
    }
}

#[test]
fn test_unaligned_write_across_blocks() {
    let irq = SimulatedInterrupts::new();
    let mut dev = device(&irq);

    assert_eq!(dev.write_at(&[7; 4], 254).unwrap(), 512);
    match &dev.controller().commands()[0] {
        FlashCommand::Program { address, data, .. } => {
            assert_eq!(*address, 0);
            assert_eq!(&data[254..258], &[7; 4]);
        }
        other => panic!("Expected Program, got {:?}", other),
    }
}

#[test]
fn test_unaligned_writes_leave_neighbours_alone() {
    let irq = SimulatedInterrupts::new();
    let mut dev = device(&irq);

    dev.write_at(b"ab", 0).unwrap();
    dev.write_at(b"cd", 2).unwrap();

    let mut buf = [0u8; 5];
    dev.read_at(&mut buf, 0).unwrap();
    assert_eq!(&buf, b"abcd\xFF");
}

#[test]
fn test_empty_write() {
    let irq = SimulatedInterrupts::new();
    let mut dev = device(&irq);

    assert_eq!(dev.write_at(&[], 0).unwrap(), 0);
    assert_eq!(dev.write_at(&[], SIZE).unwrap(), 0);
    assert!(dev.controller().commands().is_empty());
    assert_eq!(irq.disable_count(), 0);
}

#[test]
fn test_read_past_end() {
    let irq = SimulatedInterrupts::new();
    let mut dev = device(&irq);

    let mut buf = [0u8; 16];
    match dev.read_at(&mut buf, SIZE - 8) {
        Err(FlashError::ReadPastEnd { offset, len: 16, size: SIZE }) => {
            assert_eq!(offset, SIZE - 8)
        }
        other => panic!("Expected ReadPastEnd, got {:?}", other),
    }
    assert!(dev.read_at(&mut buf, u32::MAX).is_err());

    // A read ending exactly at the end is fine.
    assert_eq!(dev.read_at(&mut buf, SIZE - 16).unwrap(), 16);
    assert_eq!(dev.read_at(&mut [], SIZE).unwrap(), 0);
}

#[test]
fn test_every_disable_is_restored() {
    let irq = SimulatedInterrupts::new();
    let mut dev = device(&irq);

    dev.erase_blocks(0, 1).unwrap();
    dev.write_at(b"abc", 0).unwrap();
    let _ = dev.write_at(b"abc", SIZE);
    let _ = dev.erase_blocks(1000, 1);
    dev.transaction(&[0x05, 0x00], &mut [0u8; 2]).unwrap();

    assert_eq!(irq.disable_count(), 3);
    assert_eq!(irq.restore_count(), 3);
    assert!(irq.is_enabled());
}

#[test]
fn test_commands_inside_outer_critical_section() {
    let irq = SimulatedInterrupts::new();
    let mut dev = device(&irq);

    {
        let _outer = irq.critical_section();
        dev.write_at(b"x", 0).unwrap();
        // The device must not unmask what its caller masked.
        assert!(!irq.is_enabled());
    }
    assert!(irq.is_enabled());
    assert_eq!(dev.controller().commands()[0].interrupts_enabled(), Some(false));
}

#[test]
fn test_transaction_reply() {
    let irq = SimulatedInterrupts::new();
    let g = geometry();
    let mut flash = SimulatedFlash::for_geometry(&g).observing(&irq);
    // JEDEC ID of a Winbond W25Q16.
    flash.set_reply(&[0x00, 0xEF, 0x40, 0x15]);
    let mut dev = FlashBlockDevice::new(flash, &irq, g).unwrap();

    let mut rx = [0u8; 4];
    dev.transaction(&[0x9F, 0, 0, 0], &mut rx).unwrap();
    assert_eq!(rx, [0x00, 0xEF, 0x40, 0x15]);

    let mut long_rx = [0u8; 6];
    dev.transaction(&[0x9F, 0, 0, 0, 0, 0], &mut long_rx).unwrap();
    assert_eq!(&long_rx[4..], &[0xFF, 0xFF]);

    assert_eq!(
        dev.controller().commands()[0],
        FlashCommand::Transaction {
            tx: vec![0x9F, 0, 0, 0],
            interrupts_enabled: Some(false),
        }
    );
}

#[test]
fn test_transaction_length_mismatch() {
    let irq = SimulatedInterrupts::new();
    let mut dev = device(&irq);

    let tx = [0u8; 10];
    let mut rx = [0u8; 12];
    match dev.transaction(&tx, &mut rx) {
        Err(FlashError::LengthMismatch { tx: 10, rx: 12 }) => (),
        other => panic!("Expected LengthMismatch, got {:?}", other),
    }
    assert!(dev.controller().commands().is_empty());
    assert_eq!(irq.disable_count(), 0);
}

#[test]
fn test_empty_transaction() {
    let irq = SimulatedInterrupts::new();
    let mut dev = device(&irq);
    dev.transaction(&[], &mut []).unwrap();
    assert!(dev.controller().commands().is_empty());
}

#[test]
#[should_panic(expected = "reset into bootloader")]
fn test_enter_bootloader() {
    let irq = SimulatedInterrupts::new();
    let mut dev = device(&irq);
    dev.enter_bootloader();
}

#[test]
fn test_into_parts() {
    let irq = SimulatedInterrupts::new();
    let mut dev = device(&irq);
    dev.write_at(b"log", 0).unwrap();

    let (flash, _irq) = dev.into_parts();
    let programmed: Vec<u32> = flash
        .commands()
        .iter()
        .filter_map(|c| match c {
            FlashCommand::Program { address, .. } => Some(*address),
            _ => None,
        })
        .collect();
    assert_eq!(programmed, vec![0]);
}
