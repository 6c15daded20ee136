// In-memory Feetech servo bus for tests
//
// Decodes instruction packets written by `FeetechBus` and answers from a register
// file per servo ID. Servos that are not present never answer, so reads time out
// the same way an unplugged motor does.

use std::collections::{BTreeMap, VecDeque};
use std::io::{self, Read, Write};
use std::sync::Arc;

use super::feetech::Register;

const REGISTER_FILE_SIZE: usize = 128;
const BROADCAST_ID: u8 = 0xFE;

#[derive(Default)]
struct FakeState {
    servos: BTreeMap<u8, [u8; REGISTER_FILE_SIZE]>,
    incoming: Vec<u8>,
    outgoing: VecDeque<u8>,
}

/// Cloneable handle: one clone goes into the bus, the test keeps another
#[derive(Clone, Default)]
pub struct FakeServoBus {
    state: Arc<parking_lot::Mutex<FakeState>>,
}

impl FakeServoBus {
    pub fn new(ids: &[u8]) -> Self {
        let fake = Self::default();
        {
            let mut state = fake.state.lock();
            for &id in ids {
                state.servos.insert(id, [0u8; REGISTER_FILE_SIZE]);
            }
        }
        fake
    }

    /// Unplug a servo: it stops answering
    pub fn remove(&self, id: u8) {
        self.state.lock().servos.remove(&id);
    }

    pub fn set_u8(&self, id: u8, register: Register, value: u8) {
        if let Some(regs) = self.state.lock().servos.get_mut(&id) {
            regs[register as usize] = value;
        }
    }

    pub fn set_u16(&self, id: u8, register: Register, value: u16) {
        if let Some(regs) = self.state.lock().servos.get_mut(&id) {
            let addr = register as usize;
            regs[addr..addr + 2].copy_from_slice(&value.to_le_bytes());
        }
    }

    pub fn get_u8(&self, id: u8, register: Register) -> u8 {
        self.state
            .lock()
            .servos
            .get(&id)
            .map_or(0, |regs| regs[register as usize])
    }

    pub fn get_u16(&self, id: u8, register: Register) -> u16 {
        self.state.lock().servos.get(&id).map_or(0, |regs| {
            let addr = register as usize;
            u16::from_le_bytes([regs[addr], regs[addr + 1]])
        })
    }
}

impl FakeState {
    fn process_packets(&mut self) {
        loop {
            if self.incoming.len() < 4 {
                return;
            }
            if self.incoming[0] != 0xFF || self.incoming[1] != 0xFF {
                self.incoming.remove(0);
                continue;
            }
            let total = 4 + self.incoming[3] as usize;
            if self.incoming.len() < total {
                return;
            }
            let packet: Vec<u8> = self.incoming.drain(..total).collect();
            let id = packet[2];
            let instruction = packet[4];
            let params = packet[5..total - 1].to_vec();
            self.handle(id, instruction, &params);
        }
    }

    fn handle(&mut self, id: u8, instruction: u8, params: &[u8]) {
        match instruction {
            // Ping
            0x01 => {
                if self.servos.contains_key(&id) {
                    self.reply(id, &[]);
                }
            }
            // Read [addr, len]
            0x02 => {
                let Some(regs) = self.servos.get(&id) else {
                    return;
                };
                let addr = params[0] as usize;
                let len = params[1] as usize;
                let data = regs[addr..addr + len].to_vec();
                self.reply(id, &data);
            }
            // Write [addr, data...]
            0x03 => {
                let Some(regs) = self.servos.get_mut(&id) else {
                    return;
                };
                let addr = params[0] as usize;
                regs[addr..addr + params.len() - 1].copy_from_slice(&params[1..]);
                self.reply(id, &[]);
            }
            // Sync write [addr, len, (id, data...)*], no reply
            0x83 if id == BROADCAST_ID => {
                let addr = params[0] as usize;
                let len = params[1] as usize;
                for chunk in params[2..].chunks(len + 1) {
                    if let Some(regs) = self.servos.get_mut(&chunk[0]) {
                        regs[addr..addr + len].copy_from_slice(&chunk[1..]);
                    }
                }
            }
            _ => {}
        }
    }

    fn reply(&mut self, id: u8, data: &[u8]) {
        let length = (data.len() + 2) as u8;
        let mut body = vec![id, length, 0x00];
        body.extend_from_slice(data);
        let sum: u16 = body.iter().map(|&b| b as u16).sum();
        body.push((!sum & 0xFF) as u8);

        self.outgoing.extend([0xFF, 0xFF]);
        self.outgoing.extend(body);
    }
}

impl Write for FakeServoBus {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        state.incoming.extend_from_slice(buf);
        state.process_packets();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for FakeServoBus {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        if state.outgoing.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no response"));
        }
        let n = buf.len().min(state.outgoing.len());
        for (slot, byte) in buf.iter_mut().zip(state.outgoing.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}
