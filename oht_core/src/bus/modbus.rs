//! C3 Modbus Codec: pure encode/decode for the Modbus-RTU frames used to
//! talk to slave modules over RS485. No I/O lives here — [`super::transport`]
//! owns the serial port; this module only turns bytes into typed requests
//! and responses and back.
//!
//! Frame shape: `[slave_addr][function_code][data...][crc_lo][crc_hi]`.
//! CRC-16 uses the standard Modbus polynomial (reversed 0xA001).

use thiserror::Error;

/// Function codes implemented by the slave modules this core talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FunctionCode {
    ReadCoils = 0x01,
    ReadDiscreteInputs = 0x02,
    ReadHoldingRegisters = 0x03,
    ReadInputRegisters = 0x04,
    WriteSingleCoil = 0x05,
    WriteSingleRegister = 0x06,
    WriteMultipleCoils = 0x0F,
    WriteMultipleRegisters = 0x10,
}

impl FunctionCode {
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::ReadCoils),
            0x02 => Some(Self::ReadDiscreteInputs),
            0x03 => Some(Self::ReadHoldingRegisters),
            0x04 => Some(Self::ReadInputRegisters),
            0x05 => Some(Self::WriteSingleCoil),
            0x06 => Some(Self::WriteSingleRegister),
            0x0F => Some(Self::WriteMultipleCoils),
            0x10 => Some(Self::WriteMultipleRegisters),
            _ => None,
        }
    }

    /// Whether a slave that returns `code | 0x80` is reporting an exception
    /// for this function.
    pub const fn exception_code(self) -> u8 {
        self as u8 | 0x80
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModbusError {
    #[error("frame too short: {len} bytes")]
    FrameTooShort { len: usize },
    #[error("frame too long: {len} bytes, max is {max}")]
    FrameTooLong { len: usize, max: usize },
    #[error("CRC mismatch: frame says {expected:#06x}, computed {actual:#06x}")]
    CrcMismatch { expected: u16, actual: u16 },
    #[error("unknown function code {0:#04x}")]
    UnknownFunction(u8),
    #[error("slave {0} raised exception {1:#04x}")]
    SlaveException(u8, u8),
    #[error("byte count {declared} in frame does not match {actual} remaining bytes")]
    ByteCountMismatch { declared: usize, actual: usize },
    #[error("register count {0} exceeds the 125-register Modbus read limit")]
    TooManyRegisters(u16),
}

/// Upper bound on an RTU frame: address + function + byte-count + 2×125
/// registers + CRC, rounded up.
pub const MAX_FRAME_LEN: usize = 256;
pub type Frame = heapless::Vec<u8, MAX_FRAME_LEN>;

/// Modbus CRC-16 (polynomial 0xA001, reflected), as used by every RTU slave.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

fn push_crc(frame: &mut Frame) {
    let crc = crc16(frame);
    let _ = frame.push((crc & 0xFF) as u8);
    let _ = frame.push((crc >> 8) as u8);
}

/// Build a "read N registers" request (function 0x03 or 0x04).
pub fn encode_read_registers(
    function: FunctionCode,
    slave_addr: u8,
    start_register: u16,
    count: u16,
) -> Result<Frame, ModbusError> {
    if count == 0 || count > 125 {
        return Err(ModbusError::TooManyRegisters(count));
    }
    let mut frame = Frame::new();
    let _ = frame.push(slave_addr);
    let _ = frame.push(function as u8);
    let _ = frame.push((start_register >> 8) as u8);
    let _ = frame.push((start_register & 0xFF) as u8);
    let _ = frame.push((count >> 8) as u8);
    let _ = frame.push((count & 0xFF) as u8);
    push_crc(&mut frame);
    Ok(frame)
}

/// Build a "write single register" request (function 0x06).
pub fn encode_write_single_register(slave_addr: u8, register: u16, value: u16) -> Frame {
    let mut frame = Frame::new();
    let _ = frame.push(slave_addr);
    let _ = frame.push(FunctionCode::WriteSingleRegister as u8);
    let _ = frame.push((register >> 8) as u8);
    let _ = frame.push((register & 0xFF) as u8);
    let _ = frame.push((value >> 8) as u8);
    let _ = frame.push((value & 0xFF) as u8);
    push_crc(&mut frame);
    frame
}

/// Build a "write multiple registers" request (function 0x10).
pub fn encode_write_multiple_registers(
    slave_addr: u8,
    start_register: u16,
    values: &[u16],
) -> Result<Frame, ModbusError> {
    if values.is_empty() || values.len() > 123 {
        return Err(ModbusError::TooManyRegisters(values.len() as u16));
    }
    let mut frame = Frame::new();
    let _ = frame.push(slave_addr);
    let _ = frame.push(FunctionCode::WriteMultipleRegisters as u8);
    let _ = frame.push((start_register >> 8) as u8);
    let _ = frame.push((start_register & 0xFF) as u8);
    let _ = frame.push((values.len() >> 8) as u8);
    let _ = frame.push((values.len() & 0xFF) as u8);
    let byte_count = (values.len() * 2) as u8;
    let _ = frame.push(byte_count);
    for v in values {
        let _ = frame.push((v >> 8) as u8);
        let _ = frame.push((v & 0xFF) as u8);
    }
    push_crc(&mut frame);
    Ok(frame)
}

/// Build a "read coils/discrete inputs" request (function 0x01/0x02).
pub fn encode_read_bits(
    function: FunctionCode,
    slave_addr: u8,
    start_bit: u16,
    count: u16,
) -> Frame {
    let mut frame = Frame::new();
    let _ = frame.push(slave_addr);
    let _ = frame.push(function as u8);
    let _ = frame.push((start_bit >> 8) as u8);
    let _ = frame.push((start_bit & 0xFF) as u8);
    let _ = frame.push((count >> 8) as u8);
    let _ = frame.push((count & 0xFF) as u8);
    push_crc(&mut frame);
    frame
}

/// Build a "write single coil" request (function 0x05). Modbus encodes
/// "on" as `0xFF00` and "off" as `0x0000`.
pub fn encode_write_single_coil(slave_addr: u8, coil: u16, value: bool) -> Frame {
    let payload = if value { 0xFF00u16 } else { 0x0000u16 };
    let mut frame = Frame::new();
    let _ = frame.push(slave_addr);
    let _ = frame.push(FunctionCode::WriteSingleCoil as u8);
    let _ = frame.push((coil >> 8) as u8);
    let _ = frame.push((coil & 0xFF) as u8);
    let _ = frame.push((payload >> 8) as u8);
    let _ = frame.push((payload & 0xFF) as u8);
    push_crc(&mut frame);
    frame
}

/// A decoded response to a register-read request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterResponse {
    pub slave_addr: u8,
    pub registers: heapless::Vec<u16, 125>,
}

/// Validate the trailing CRC and strip it, returning the CRC-checked body.
fn verify_and_strip_crc(raw: &[u8]) -> Result<&[u8], ModbusError> {
    if raw.len() < 4 {
        return Err(ModbusError::FrameTooShort { len: raw.len() });
    }
    if raw.len() > MAX_FRAME_LEN {
        return Err(ModbusError::FrameTooLong { len: raw.len(), max: MAX_FRAME_LEN });
    }
    let (body, crc_bytes) = raw.split_at(raw.len() - 2);
    let expected = u16::from_le_bytes([crc_bytes[0], crc_bytes[1]]);
    let actual = crc16(body);
    if expected != actual {
        return Err(ModbusError::CrcMismatch { expected, actual });
    }
    Ok(body)
}

/// Decode a response to a register-read request (function 0x03/0x04).
pub fn decode_read_registers_response(raw: &[u8]) -> Result<RegisterResponse, ModbusError> {
    let body = verify_and_strip_crc(raw)?;
    if body.len() < 3 {
        return Err(ModbusError::FrameTooShort { len: body.len() });
    }
    let slave_addr = body[0];
    let function = body[1];
    if function & 0x80 != 0 {
        return Err(ModbusError::SlaveException(slave_addr, body.get(2).copied().unwrap_or(0)));
    }
    if FunctionCode::from_u8(function).is_none() {
        return Err(ModbusError::UnknownFunction(function));
    }
    let byte_count = body[2] as usize;
    let register_bytes = &body[3..];
    if register_bytes.len() != byte_count {
        return Err(ModbusError::ByteCountMismatch { declared: byte_count, actual: register_bytes.len() });
    }
    let mut registers = heapless::Vec::new();
    for pair in register_bytes.chunks_exact(2) {
        let _ = registers.push(u16::from_be_bytes([pair[0], pair[1]]));
    }
    Ok(RegisterResponse { slave_addr, registers })
}

/// Decode the acknowledgement to a write request (echoes address/value),
/// returning the slave address for correlation.
pub fn decode_write_ack(raw: &[u8]) -> Result<u8, ModbusError> {
    let body = verify_and_strip_crc(raw)?;
    if body.len() < 2 {
        return Err(ModbusError::FrameTooShort { len: body.len() });
    }
    let slave_addr = body[0];
    let function = body[1];
    if function & 0x80 != 0 {
        return Err(ModbusError::SlaveException(slave_addr, body.get(2).copied().unwrap_or(0)));
    }
    Ok(slave_addr)
}
