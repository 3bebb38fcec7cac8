//! EE and IOP interrupt controllers.
//!
//! Neither controller pushes into the CPUs; each CPU polls its pending line
//! at the top of the instruction loop and reflects it into COP0 Cause.IP.

/// EE INTC sources, by STAT/MASK bit index.
#[derive(Clone, Copy, Debug)]
pub enum Interrupt {
    Gs = 0,
    Sbus = 1,
    VblankStart = 2,
    VblankEnd = 3,
    Vif0 = 4,
    Vif1 = 5,
    Vu0 = 6,
    Vu1 = 7,
    Ipu = 8,
    Timer0 = 9,
    Timer1 = 10,
    Timer2 = 11,
    Timer3 = 12,
    Sfifo = 13,
    Vu0Watchdog = 14,
}

/// IOP sources, by I_STAT/I_MASK bit index.
#[derive(Clone, Copy, Debug)]
pub enum IopInterrupt {
    VblankStart = 0,
    Gpu = 1,
    Cdvd = 2,
    Dma = 3,
    Timer0 = 4,
    Timer1 = 5,
    Timer2 = 6,
    Sio0 = 7,
    Sio1 = 8,
    Spu2 = 9,
    Pio = 10,
    VblankEnd = 11,
    Dvd = 12,
    Pcmcia = 13,
    Timer3 = 14,
    Timer4 = 15,
    Timer5 = 16,
    Sio2 = 17,
    Htr0 = 18,
    Htr1 = 19,
    Htr2 = 20,
    Htr3 = 21,
    Usb = 22,
    Extr = 23,
    FireWire = 24,
    Fdma = 25,
}

const INTC_MASK_BITS: u16 = 0x7FFF;
const I_STAT_BITS: u32 = 0x3FF_FFFF;

/// Both interrupt controllers. The EE half is a 15-bit STAT/MASK pair, the
/// IOP half is I_STAT/I_MASK/I_CTRL.
pub struct Intc {
    intc_stat: u16,
    intc_mask: u16,

    i_stat: u32,
    i_mask: u32,
    i_ctrl: bool,
}

impl Intc {
    pub fn new() -> Self {
        Self { intc_stat: 0, intc_mask: 0, i_stat: 0, i_mask: 0, i_ctrl: false }
    }

    /* --- EE side --- */

    pub fn read_stat(&self) -> u16 {
        self.intc_stat
    }

    pub fn read_mask(&self) -> u16 {
        self.intc_mask
    }

    /// INTC_STAT is write-1-to-clear.
    pub fn write_stat(&mut self, data: u16) {
        self.intc_stat = (self.intc_stat & !data) & INTC_MASK_BITS;
    }

    /// INTC_MASK is write-1-to-toggle.
    pub fn write_mask(&mut self, data: u16) {
        self.intc_mask = (self.intc_mask ^ data) & INTC_MASK_BITS;
    }

    pub fn send_interrupt(&mut self, int: Interrupt) {
        tracing::debug!(target: "moe_core::intc", "EE {:?} interrupt request", int);

        self.intc_stat |= 1 << int as u16;
    }

    /// The EE interrupt line (INT0).
    pub fn pending_ee(&self) -> bool {
        self.intc_stat & self.intc_mask != 0
    }

    /* --- IOP side --- */

    pub fn read_i_stat(&self) -> u32 {
        self.i_stat
    }

    pub fn read_i_mask(&self) -> u32 {
        self.i_mask
    }

    /// Reading I_CTRL returns the previous value and turns interrupts off.
    pub fn read_i_ctrl(&mut self) -> u32 {
        let old = self.i_ctrl;

        self.i_ctrl = false;

        old as u32
    }

    /// I_STAT is write-1-to-clear.
    pub fn write_i_stat(&mut self, data: u32) {
        self.i_stat = (self.i_stat & !data) & I_STAT_BITS;
    }

    pub fn write_i_mask(&mut self, data: u32) {
        self.i_mask = data & I_STAT_BITS;
    }

    pub fn write_i_ctrl(&mut self, data: u32) {
        self.i_ctrl = data & 1 != 0;
    }

    pub fn send_interrupt_iop(&mut self, int: IopInterrupt) {
        tracing::debug!(target: "moe_core::intc", "IOP {:?} interrupt request", int);

        self.i_stat |= 1 << int as u32;
    }

    /// The IOP interrupt line.
    pub fn pending_iop(&self) -> bool {
        self.i_ctrl && (self.i_stat & self.i_mask) != 0
    }
}

impl Default for Intc {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ee_stat_clears_on_written_bits_and_mask_toggles() {
        let mut intc = Intc::new();

        intc.send_interrupt(Interrupt::VblankStart);
        intc.send_interrupt(Interrupt::Timer0);
        assert_eq!(intc.read_stat(), (1 << 2) | (1 << 9));

        assert!(!intc.pending_ee());
        intc.write_mask(1 << 2);
        assert!(intc.pending_ee());

        intc.write_stat(1 << 2);
        assert_eq!(intc.read_stat(), 1 << 9);
        assert!(!intc.pending_ee());

        intc.write_mask(1 << 2);
        assert_eq!(intc.read_mask(), 0);
    }

    #[test]
    fn iop_pending_requires_master_enable() {
        let mut intc = Intc::new();

        intc.send_interrupt_iop(IopInterrupt::Cdvd);
        intc.write_i_mask(1 << 2);
        assert!(!intc.pending_iop());

        intc.write_i_ctrl(1);
        assert!(intc.pending_iop());

        // Reading I_CTRL returns the old value and disables interrupts.
        assert_eq!(intc.read_i_ctrl(), 1);
        assert_eq!(intc.read_i_ctrl(), 0);
        assert!(!intc.pending_iop());
    }

    #[test]
    fn i_stat_write_one_to_clear() {
        let mut intc = Intc::new();

        intc.send_interrupt_iop(IopInterrupt::Dma);
        intc.send_interrupt_iop(IopInterrupt::VblankStart);

        intc.write_i_stat(1 << 3);
        assert_eq!(intc.read_i_stat(), 1 << 0);
    }
}
