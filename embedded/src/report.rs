// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use mcu_runtime::FlashGeometry;
use serde::Serialize;

use crate::transport;

/// Status exported over UART as JSON.
#[derive(Serialize, Debug)]
pub struct StatusReport {
    pub wakes: u32,
    pub erases: u32,
    pub next_offset: u32,
    /// Sequence number read back from flash for the latest record.
    pub last_sequence: u32,
    pub geometry: FlashGeometry,
}

pub fn export(report: &StatusReport) {
    let mut buf = [0u8; 256];
    match serde_json_core::to_slice(report, &mut buf) {
        Ok(len) => transport::export_report(&buf[0..len]),
        Err(_) => transport::export_error(b"REPORT_FAIL"),
    }
}
