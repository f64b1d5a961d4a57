// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
// Packet Headers
const SYNC_WORD: [u8; 4] = [0x55, 0xAA, 0x55, 0xAA];
const TYPE_REPORT: u8 = 0x01;
const TYPE_ERR: u8 = 0xEE;

/// UART0 data register on the LM3S6965.
const UART0_DR: *mut u32 = 0x4000_C000 as *mut u32;

fn uart_write(byte: u8) {
    // QEMU's UART never reports a full FIFO, so no flag polling.
    unsafe { core::ptr::write_volatile(UART0_DR, byte as u32) }
}

fn send_chunk(type_id: u8, data: &[u8]) {
    // [SYNC:4][TYPE:1][LEN:4 LE][PAYLOAD]
    for b in SYNC_WORD.iter() {
        uart_write(*b);
    }
    uart_write(type_id);
    for b in (data.len() as u32).to_le_bytes().iter() {
        uart_write(*b);
    }
    for b in data.iter() {
        uart_write(*b);
    }
}

pub fn export_report(report_json: &[u8]) {
    send_chunk(TYPE_REPORT, report_json);
}

pub fn export_error(err_code: &[u8]) {
    send_chunk(TYPE_ERR, err_code);
}
