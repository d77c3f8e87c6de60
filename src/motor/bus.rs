// Wheel board serial protocol
//
// Frame: [0xFF, 0xFF, id, len, instruction, params.., checksum]. `len` covers
// instruction, params and checksum. A reply carries a status byte in the
// instruction slot. The checksum is the complement of the byte sum from `id`
// through the last param.

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use serialport::SerialPort;
use tracing::{debug, trace};

pub const BAUDRATE: u32 = 1_000_000;

/// A reply takes well under a millisecond at 1 Mbaud; anything slower is a fault
const REPLY_TIMEOUT: Duration = Duration::from_millis(20);

const SYNC: [u8; 2] = [0xFF, 0xFF];

/// Every channel acts on it, none replies
const BROADCAST_ID: u8 = 0xFE;

/// Width of the board's quadrature counters
pub const COUNTER_BITS: u32 = 16;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Read = 0x02,
    Write = 0x03,
    SyncWrite = 0x83,
}

/// Register map of one motor channel
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    /// u8, read-only
    FirmwareVersion = 0,
    /// u8, 0 lets the motor coast
    DriverEnable = 10,
    /// u16, wrapping quadrature count
    EncoderCount = 16,
    /// u16, sign-magnitude duty, bit 15 set for reverse
    MotorOutput = 20,
}

/// Device faults reported by a wheel board
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed reply from channel {id}: {reason}")]
    Malformed { id: u8, reason: String },

    #[error("Checksum mismatch for channel {id}")]
    ChecksumMismatch { id: u8 },

    #[error("Channel {id} reported fault status 0x{status:02X}")]
    DriverFault { id: u8, status: u8 },

    #[error("Channel {id} did not reply")]
    Timeout { id: u8 },

    #[error("Simulated fault: {0}")]
    Simulated(&'static str),
}

pub type Result<T> = std::result::Result<T, BoardError>;

fn checksum(bytes: &[u8]) -> u8 {
    !bytes.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

fn encode_frame(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(params.len() + 6);
    frame.extend_from_slice(&SYNC);
    frame.extend_from_slice(&[id, params.len() as u8 + 2, instruction as u8]);
    frame.extend_from_slice(params);
    frame.push(checksum(&frame[2..]));
    frame
}

/// Verify a reply body (status, params.., checksum) and return the params
fn decode_reply(id: u8, len: u8, body: &[u8]) -> Result<&[u8]> {
    let (&received, covered) = body.split_last().ok_or_else(|| BoardError::Malformed {
        id,
        reason: "empty reply".to_string(),
    })?;
    let (&status, params) = covered.split_first().ok_or_else(|| BoardError::Malformed {
        id,
        reason: "reply without status byte".to_string(),
    })?;

    let expected = !covered
        .iter()
        .fold(id.wrapping_add(len), |sum, &b| sum.wrapping_add(b));
    if expected != received {
        return Err(BoardError::ChecksumMismatch { id });
    }
    if status != 0 {
        return Err(BoardError::DriverFault { id, status });
    }
    Ok(params)
}

/// Bit 15 = sign (1 = reverse), bits 0-14 = magnitude
pub fn encode_sign_magnitude(value: i16) -> u16 {
    let magnitude = value.unsigned_abs() & 0x7FFF;
    if value < 0 { 0x8000 | magnitude } else { magnitude }
}

/// Serial link to the wheel board's motor channels
pub struct WheelBus {
    port: Box<dyn SerialPort>,
}

impl WheelBus {
    pub fn open(path: &str) -> Result<Self> {
        let port = serialport::new(path, BAUDRATE).timeout(REPLY_TIMEOUT).open()?;
        Ok(Self { port })
    }

    fn send(&mut self, frame: &[u8]) -> Result<()> {
        trace!("-> {:02X?}", frame);
        self.port.write_all(frame)?;
        self.port.flush()?;
        Ok(())
    }

    /// Send one addressed frame and wait for that channel's reply
    fn transact(&mut self, id: u8, instruction: Instruction, params: &[u8]) -> Result<Vec<u8>> {
        self.send(&encode_frame(id, instruction, params))?;

        let mut head = [0u8; 4];
        self.port.read_exact(&mut head).map_err(|e| match e.kind() {
            ErrorKind::TimedOut => BoardError::Timeout { id },
            _ => BoardError::Io(e),
        })?;
        let [sync0, sync1, reply_id, len] = head;
        if [sync0, sync1] != SYNC || reply_id != id {
            return Err(BoardError::Malformed {
                id,
                reason: format!("unexpected reply head {:02X?}", head),
            });
        }

        let mut body = vec![0u8; usize::from(len)];
        self.port.read_exact(&mut body)?;
        decode_reply(id, len, &body).map(<[u8]>::to_vec)
    }

    fn read_register<const N: usize>(&mut self, id: u8, register: Register) -> Result<[u8; N]> {
        let reply = self.transact(id, Instruction::Read, &[register as u8, N as u8])?;
        reply
            .get(..N)
            .and_then(|bytes| <[u8; N]>::try_from(bytes).ok())
            .ok_or_else(|| BoardError::Malformed {
                id,
                reason: format!("{:?}: expected {} bytes, got {}", register, N, reply.len()),
            })
    }

    fn write_register(&mut self, id: u8, register: Register, data: &[u8]) -> Result<()> {
        let mut params = Vec::with_capacity(data.len() + 1);
        params.push(register as u8);
        params.extend_from_slice(data);
        self.transact(id, Instruction::Write, &params).map(drop)
    }

    pub fn firmware_version(&mut self, id: u8) -> Result<u8> {
        let [version] = self.read_register(id, Register::FirmwareVersion)?;
        Ok(version)
    }

    pub fn encoder_count(&mut self, id: u8) -> Result<u16> {
        self.read_register(id, Register::EncoderCount)
            .map(u16::from_le_bytes)
    }

    pub fn set_output(&mut self, id: u8, output: i16) -> Result<()> {
        let raw = encode_sign_magnitude(output).to_le_bytes();
        self.write_register(id, Register::MotorOutput, &raw)
    }

    pub fn set_driver_enabled(&mut self, id: u8, enabled: bool) -> Result<()> {
        debug!("Channel {} driver enabled={}", id, enabled);
        self.write_register(id, Register::DriverEnable, &[u8::from(enabled)])
    }

    /// Set several channels' outputs in one broadcast frame, without a reply
    pub fn sync_set_outputs(&mut self, outputs: &[(u8, i16)]) -> Result<()> {
        if outputs.is_empty() {
            return Ok(());
        }
        // [register, bytes per channel, then id, lo, hi for each channel]
        let mut params = vec![Register::MotorOutput as u8, 2];
        for &(id, output) in outputs {
            params.push(id);
            params.extend_from_slice(&encode_sign_magnitude(output).to_le_bytes());
        }
        self.send(&encode_frame(BROADCAST_ID, Instruction::SyncWrite, &params))
    }
}
