//! Observation hooks: compiled / entered / exited / executed events.
//! Pure side channel; implementations receive copies and addresses only
//! and cannot influence machine state.

use crate::routine::Routine;

pub trait MachineHooks {
    fn routine_compiled(&mut self, _addr: u32, _routine: &Routine) {}
    fn routine_entered(&mut self, _addr: u32) {}
    fn routine_exited(&mut self, _addr: u32) {}
    fn instruction_executed(&mut self, _addr: u32) {}
}

/// The default: observe nothing.
pub struct NullHooks;

impl MachineHooks for NullHooks {}

/// Simple counting hooks, handy in tests and profiling dumps.
#[derive(Default)]
pub struct CountingHooks {
    pub compiled: Vec<u32>,
    pub entered: u64,
    pub exited: u64,
    pub executed: u64,
}

impl MachineHooks for CountingHooks {
    fn routine_compiled(&mut self, addr: u32, _routine: &Routine) {
        self.compiled.push(addr);
    }

    fn routine_entered(&mut self, _addr: u32) {
        self.entered += 1;
    }

    fn routine_exited(&mut self, _addr: u32) {
        self.exited += 1;
    }

    fn instruction_executed(&mut self, _addr: u32) {
        self.executed += 1;
    }
}
