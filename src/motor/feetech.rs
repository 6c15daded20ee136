// Feetech STS3215 serial protocol implementation
//
// Protocol is similar to Dynamixel Protocol 1.0:
// Packet format: [0xFF, 0xFF, ID, Length, Instruction, Params..., Checksum]
//
// The swerve modules run both servos in PWM (open-loop) mode; closed-loop control
// happens on the host so every backend shares the same control law.

use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default serial configuration for Feetech motors
pub const DEFAULT_BAUDRATE: u32 = 1_000_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Packet header bytes
const HEADER: [u8; 2] = [0xFF, 0xFF];

/// Instruction set
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
    RegWrite = 0x04,
    Action = 0x05,
    SyncWrite = 0x83,
}

/// Register addresses for STS3215
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Register {
    // EEPROM area (persists across power cycles)
    ModelNumber = 3, // 2 bytes, read-only
    Id = 5,          // 1 byte
    BaudRate = 6,    // 1 byte

    // RAM area (volatile)
    OperatingMode = 33,      // 1 byte: 0=position, 1=velocity, 2=PWM, 3=step
    TorqueEnable = 40,       // 1 byte: 0=off, 1=on
    GoalPosition = 42,       // 2 bytes
    GoalPwm = 44,            // 2 bytes (sign bit 10, PWM mode), shares the goal-time slot
    GoalVelocity = 46,       // 2 bytes (signed, velocity mode)
    Lock = 55,               // 1 byte: 0=unlocked, 1=locked
    PresentPosition = 56,    // 2 bytes, read-only
    PresentVelocity = 58,    // 2 bytes, read-only (signed)
    PresentVoltage = 62,     // 1 byte, read-only, 0.1 V units
    PresentTemperature = 63, // 1 byte, read-only, degrees C
    PresentCurrent = 69,     // 2 bytes, read-only, 6.5 mA units
}

/// Encoder resolution: 4096 steps per revolution
pub const STEPS_PER_REVOLUTION: u16 = 4096;

/// Full-scale PWM command in PWM mode
pub const PWM_FULL_SCALE: i16 = 1000;

/// Amps per present-current count
const AMPS_PER_CURRENT_COUNT: f64 = 0.0065;

/// Operating modes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperatingMode {
    Position = 0,
    Velocity = 1,
    Pwm = 2,
    Step = 3,
}

/// Error types for Feetech communication
#[derive(Debug, thiserror::Error)]
pub enum FeetechError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from motor {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("Checksum mismatch for motor {id}")]
    ChecksumMismatch { id: u8 },

    #[error("Motor {id} returned error status: 0x{status:02X}")]
    MotorError { id: u8, status: u8 },

    #[error("Timeout waiting for response from motor {id}")]
    Timeout { id: u8 },
}

pub type Result<T> = std::result::Result<T, FeetechError>;

/// Byte stream the bus talks over (a serial port, or a fake in tests)
pub trait Transport: Read + Write + Send {}

impl<T: Read + Write + Send> Transport for T {}

/// Bus handle shared by the four modules and the odometry sampler
pub type SharedBus = Arc<parking_lot::Mutex<FeetechBus>>;

/// Feetech motor bus - handles serial communication with motors
pub struct FeetechBus {
    port: Box<dyn Transport>,
}

impl FeetechBus {
    /// Open a new connection to the motor bus
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE)
    }

    /// Open with custom baudrate
    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self::from_transport(port))
    }

    /// Wrap an already-open byte stream
    pub fn from_transport(port: impl Transport + 'static) -> Self {
        Self {
            port: Box::new(port),
        }
    }

    /// Move the bus behind a mutex so several owners can share it
    pub fn into_shared(self) -> SharedBus {
        Arc::new(parking_lot::Mutex::new(self))
    }

    /// Calculate checksum for a packet (excluding header)
    fn checksum(data: &[u8]) -> u8 {
        let sum: u16 = data.iter().map(|&b| b as u16).sum();
        (!sum & 0xFF) as u8
    }

    /// Build a packet with header and checksum
    fn build_packet(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 2) as u8; // params + instruction + checksum
        let mut packet = Vec::with_capacity(6 + params.len());

        packet.extend_from_slice(&HEADER);
        packet.push(id);
        packet.push(length);
        packet.push(instruction as u8);
        packet.extend_from_slice(params);

        // Checksum over id, length, instruction, params
        let checksum_data = &packet[2..]; // skip header
        packet.push(Self::checksum(checksum_data));

        packet
    }

    /// Send a packet and optionally wait for response
    fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.port.write_all(packet)?;
        self.port.flush()?;
        Ok(())
    }

    /// Fill `buf`, mapping a port timeout to `FeetechError::Timeout`
    fn read_exact_or_timeout(&mut self, buf: &mut [u8], expected_id: u8) -> Result<()> {
        self.port.read_exact(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                FeetechError::Timeout { id: expected_id }
            } else {
                FeetechError::Io(e)
            }
        })
    }

    /// Read a response packet
    fn read_response(&mut self, expected_id: u8) -> Result<Vec<u8>> {
        let mut header = [0u8; 2];
        self.read_exact_or_timeout(&mut header, expected_id)?;

        if header != HEADER {
            return Err(FeetechError::InvalidResponse {
                id: expected_id,
                reason: format!("Invalid header: {:02X?}", header),
            });
        }

        let mut id_length = [0u8; 2];
        self.read_exact_or_timeout(&mut id_length, expected_id)?;
        let id = id_length[0];
        let length = id_length[1] as usize;

        if id != expected_id {
            return Err(FeetechError::InvalidResponse {
                id: expected_id,
                reason: format!("ID mismatch: expected {}, got {}", expected_id, id),
            });
        }

        // Read remaining bytes (error + params + checksum = length bytes)
        if length < 2 {
            return Err(FeetechError::InvalidResponse {
                id,
                reason: format!("Length {} too short", length),
            });
        }
        let mut remaining = vec![0u8; length];
        self.read_exact_or_timeout(&mut remaining, expected_id)?;

        // Verify checksum
        let mut checksum_data = vec![id, length as u8];
        checksum_data.extend_from_slice(&remaining[..remaining.len() - 1]);
        let expected_checksum = Self::checksum(&checksum_data);
        let received_checksum = remaining[remaining.len() - 1];

        if expected_checksum != received_checksum {
            return Err(FeetechError::ChecksumMismatch { id });
        }

        // Check error status
        let error_status = remaining[0];
        if error_status != 0 {
            return Err(FeetechError::MotorError {
                id,
                status: error_status,
            });
        }

        // Return parameters (excluding error byte and checksum)
        Ok(remaining[1..remaining.len() - 1].to_vec())
    }

    /// Ping a motor to check if it's connected
    pub fn ping(&mut self, id: u8) -> Result<bool> {
        let packet = Self::build_packet(id, Instruction::Ping, &[]);
        self.send_packet(&packet)?;

        match self.read_response(id) {
            Ok(_) => Ok(true),
            Err(FeetechError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Write a single byte to a register
    pub fn write_u8(&mut self, id: u8, register: Register, value: u8) -> Result<()> {
        let params = [register as u8, value];
        let packet = Self::build_packet(id, Instruction::Write, &params);
        debug!(
            "Write u8 to motor {}: reg={:?}, value={}",
            id, register, value
        );
        self.send_packet(&packet)?;

        // Read status response
        let _ = self.read_response(id)?;
        Ok(())
    }

    /// Write two bytes (little-endian) to a register
    pub fn write_u16(&mut self, id: u8, register: Register, value: u16) -> Result<()> {
        let params = [register as u8, (value & 0xFF) as u8, (value >> 8) as u8];
        let packet = Self::build_packet(id, Instruction::Write, &params);
        debug!(
            "Write u16 to motor {}: reg={:?}, value={}",
            id, register, value
        );
        self.send_packet(&packet)?;

        let _ = self.read_response(id)?;
        Ok(())
    }

    /// Read a single byte from a register
    pub fn read_u8(&mut self, id: u8, register: Register) -> Result<u8> {
        let params = [register as u8, 1]; // address, length
        let packet = Self::build_packet(id, Instruction::Read, &params);
        self.send_packet(&packet)?;

        let response = self.read_response(id)?;
        if response.is_empty() {
            return Err(FeetechError::InvalidResponse {
                id,
                reason: "Empty response".to_string(),
            });
        }
        Ok(response[0])
    }

    /// Read two bytes (little-endian) from a register
    pub fn read_u16(&mut self, id: u8, register: Register) -> Result<u16> {
        let params = [register as u8, 2]; // address, length
        let packet = Self::build_packet(id, Instruction::Read, &params);
        self.send_packet(&packet)?;

        let response = self.read_response(id)?;
        if response.len() < 2 {
            return Err(FeetechError::InvalidResponse {
                id,
                reason: format!("Expected 2 bytes, got {}", response.len()),
            });
        }
        Ok(u16::from_le_bytes([response[0], response[1]]))
    }

    /// Sync write: write same register to multiple motors efficiently
    /// data: [(id, value), ...]
    pub fn sync_write_u16(&mut self, register: Register, data: &[(u8, u16)]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        // Sync write format:
        // [start_addr, data_length, id1, data1_lo, data1_hi, id2, data2_lo, data2_hi, ...]
        let data_length: u8 = 2; // 2 bytes per motor
        let mut params = vec![register as u8, data_length];

        for &(id, value) in data {
            params.push(id);
            params.push((value & 0xFF) as u8);
            params.push((value >> 8) as u8);
        }

        // Broadcast ID for sync write
        let packet = Self::build_packet(0xFE, Instruction::SyncWrite, &params);
        debug!("Sync write to {} motors: reg={:?}", data.len(), register);
        self.send_packet(&packet)?;

        // Sync write has no response
        Ok(())
    }

    // === High-level convenience methods ===

    /// Enable torque on a motor
    pub fn enable_torque(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 1)?;
        self.write_u8(id, Register::Lock, 1)
    }

    /// Disable torque on a motor
    pub fn disable_torque(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 0)?;
        self.write_u8(id, Register::Lock, 0)
    }

    /// Set operating mode (must disable torque first)
    pub fn set_operating_mode(&mut self, id: u8, mode: OperatingMode) -> Result<()> {
        self.write_u8(id, Register::OperatingMode, mode as u8)
    }

    /// Read present velocity from a motor (steps/s)
    pub fn get_velocity(&mut self, id: u8) -> Result<i16> {
        let raw = self.read_u16(id, Register::PresentVelocity)?;
        Ok(decode_sign_magnitude(raw))
    }

    /// Read present encoder position (0..4095)
    pub fn get_position(&mut self, id: u8) -> Result<u16> {
        let raw = self.read_u16(id, Register::PresentPosition)?;
        Ok(raw % STEPS_PER_REVOLUTION)
    }

    /// Set open-loop PWM (must be in PWM mode), clamped to full scale
    pub fn set_pwm(&mut self, id: u8, pwm: i16) -> Result<()> {
        let pwm = pwm.clamp(-PWM_FULL_SCALE, PWM_FULL_SCALE);
        self.write_u16(id, Register::GoalPwm, encode_pwm(pwm))
    }

    /// Sync write PWM to several motors in one packet
    pub fn sync_write_pwm(&mut self, data: &[(u8, i16)]) -> Result<()> {
        let encoded: Vec<(u8, u16)> = data
            .iter()
            .map(|&(id, pwm)| (id, encode_pwm(pwm.clamp(-PWM_FULL_SCALE, PWM_FULL_SCALE))))
            .collect();
        self.sync_write_u16(Register::GoalPwm, &encoded)
    }

    /// Read supply voltage at the servo (volts)
    pub fn get_supply_voltage(&mut self, id: u8) -> Result<f64> {
        Ok(self.read_u8(id, Register::PresentVoltage)? as f64 / 10.0)
    }

    /// Read internal temperature (degrees C)
    pub fn get_temperature(&mut self, id: u8) -> Result<f64> {
        Ok(self.read_u8(id, Register::PresentTemperature)? as f64)
    }

    /// Read present current draw (amps, magnitude)
    pub fn get_current(&mut self, id: u8) -> Result<f64> {
        let raw = self.read_u16(id, Register::PresentCurrent)?;
        Ok((raw & 0x7FFF) as f64 * AMPS_PER_CURRENT_COUNT)
    }
}

/// Encode PWM: bit 10 = direction (1 = negative), bits 0-9 = duty
fn encode_pwm(value: i16) -> u16 {
    let magnitude = value.unsigned_abs() & 0x03FF;
    if value < 0 { 0x0400 | magnitude } else { magnitude }
}

/// Decode sign-magnitude format to signed value
fn decode_sign_magnitude(raw: u16) -> i16 {
    let magnitude = (raw & 0x7FFF) as i16;
    if raw & 0x8000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}
