#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;

use hase_zenoh_runtime::motor::{BoardError, MotorCommand, Wheel, WheelBoard};

#[derive(Debug, Default)]
pub struct BoardState {
    pub raw: [u32; 2],
    pub written: [MotorCommand; 2],
    pub writes: usize,
    pub fail_writes: [bool; 2],
    pub fail_reads: [bool; 2],
}

/// Board whose counters the test sets by hand; clones share state
#[derive(Clone)]
pub struct ScriptedBoard {
    pub state: Arc<Mutex<BoardState>>,
    bits: u32,
}

impl ScriptedBoard {
    pub fn new(bits: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(BoardState::default())),
            bits,
        }
    }

    pub fn set_raw(&self, wheel: Wheel, raw: u32) {
        self.state.lock().raw[wheel.index()] = raw;
    }

    pub fn advance(&self, wheel: Wheel, ticks: i32) {
        let mut state = self.state.lock();
        let raw = &mut state.raw[wheel.index()];
        *raw = raw.wrapping_add(ticks as u32) & mask(self.bits);
    }

    pub fn written(&self, wheel: Wheel) -> MotorCommand {
        self.state.lock().written[wheel.index()]
    }

    pub fn fail_writes(&self, wheel: Wheel, fail: bool) {
        self.state.lock().fail_writes[wheel.index()] = fail;
    }

    pub fn fail_reads(&self, wheel: Wheel, fail: bool) {
        self.state.lock().fail_reads[wheel.index()] = fail;
    }
}

fn mask(bits: u32) -> u32 {
    if bits == 32 { u32::MAX } else { (1 << bits) - 1 }
}

impl WheelBoard for ScriptedBoard {
    fn read_encoder(&mut self, wheel: Wheel) -> Result<u32, BoardError> {
        let state = self.state.lock();
        if state.fail_reads[wheel.index()] {
            return Err(BoardError::Simulated("encoder read failed"));
        }
        Ok(state.raw[wheel.index()])
    }

    fn counter_bits(&self) -> u32 {
        self.bits
    }

    fn write_motor(&mut self, wheel: Wheel, command: MotorCommand) -> Result<(), BoardError> {
        let mut state = self.state.lock();
        if state.fail_writes[wheel.index()] {
            return Err(BoardError::Simulated("driver refused command"));
        }
        state.written[wheel.index()] = command;
        state.writes += 1;
        Ok(())
    }
}
