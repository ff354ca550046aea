//! Data model shared by the file-transfer client (C9, §3/§4.9).

/// One file named in a transfer, as recorded in a job ad's file list or
/// produced while walking a sandbox.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferItem {
  pub dest_path: String,
  pub size: i64,
  pub mode: u32,
  pub checksum: Option<String>,
  pub checksum_algorithm: Option<String>,
}

impl TransferItem {
  pub fn new(dest_path: impl Into<String>, size: i64, mode: u32) -> TransferItem {
    TransferItem {
      dest_path: dest_path.into(),
      size,
      mode,
      checksum: None,
      checksum_algorithm: None,
    }
  }
}

/// Fixed wire values for the per-file sub-protocol command byte (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferCommand {
  Finished,
  XferFile,
  EnableEncryption,
  DisableEncryption,
  XferX509,
  DownloadUrl,
  Mkdir,
  Other(i32),
}

impl TransferCommand {
  pub fn wire_value(self) -> i32 {
    match self {
      TransferCommand::Finished => 0,
      TransferCommand::XferFile => 1,
      TransferCommand::EnableEncryption => 2,
      TransferCommand::DisableEncryption => 3,
      TransferCommand::XferX509 => 4,
      TransferCommand::DownloadUrl => 5,
      TransferCommand::Mkdir => 6,
      TransferCommand::Other(_) => 999,
    }
  }

  pub fn from_wire(value: i32) -> TransferCommand {
    match value {
      0 => TransferCommand::Finished,
      1 => TransferCommand::XferFile,
      2 => TransferCommand::EnableEncryption,
      3 => TransferCommand::DisableEncryption,
      4 => TransferCommand::XferX509,
      5 => TransferCommand::DownloadUrl,
      6 => TransferCommand::Mkdir,
      other => TransferCommand::Other(other),
    }
  }
}

/// The GoAhead handshake sentinel meaning "proceed for the rest of this
/// job without further handshakes" (§4.9.1).
pub const GO_AHEAD_ALWAYS: i64 = 2;

/// Upper bound on a single chunked payload message (§4.9.1).
pub const AES_CHUNK_SIZE: usize = 256 * 1024;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn wire_values_are_fixed() {
    assert_eq!(TransferCommand::Finished.wire_value(), 0);
    assert_eq!(TransferCommand::XferFile.wire_value(), 1);
    assert_eq!(TransferCommand::Mkdir.wire_value(), 6);
    assert_eq!(TransferCommand::Other(42).wire_value(), 999);
  }

  #[test]
  fn from_wire_round_trips_named_values() {
    for cmd in [
      TransferCommand::Finished,
      TransferCommand::XferFile,
      TransferCommand::EnableEncryption,
      TransferCommand::DisableEncryption,
      TransferCommand::XferX509,
      TransferCommand::DownloadUrl,
      TransferCommand::Mkdir,
    ] {
      assert_eq!(TransferCommand::from_wire(cmd.wire_value()), cmd);
    }
  }
}
