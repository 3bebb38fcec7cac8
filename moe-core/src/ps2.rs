//! Top-level machine: init, the macro-tick loop and the fast-boot patcher.

use std::fs::File;
use std::path::Path;

use anyhow::{ensure, Context};

use crate::bus::Bus;
use crate::ee::cpu::Ee;
use crate::iop::cpu::Iop;

const BIOS_SIZE: usize = 0x40_0000;

/// EELOAD region scanned for the OSDSYS boot path.
const EELOAD_START: usize = 0x82000;
const EELOAD_END: usize = 0xA2000;

pub struct Ps2 {
    pub ee: Ee,
    pub iop: Iop,
    pub bus: Bus,

    /// EE cycles not yet accounted to the IOP (1 IOP cycle per 8 EE cycles).
    iop_residual: i64,
}

impl Ps2 {
    pub fn new(bios_path: &Path, disc_path: Option<&Path>) -> anyhow::Result<Self> {
        tracing::info!(target: "moe_core::ps2", "BIOS path: {bios_path:?}, disc path: {disc_path:?}");

        let bios = std::fs::read(bios_path)
            .with_context(|| format!("unable to read BIOS image {bios_path:?}"))?;

        ensure!(bios.len() == BIOS_SIZE, "BIOS image is not 4 MiB ({} bytes)", bios.len());

        let disc = disc_path
            .map(|path| {
                File::open(path).with_context(|| format!("unable to open disc image {path:?}"))
            })
            .transpose()?;

        let mut ee = Ee::new();
        ee.fast_boot = disc.is_some();

        Ok(Self { ee, iop: Iop::new(), bus: Bus::new(bios, disc), iop_residual: 0 })
    }

    /// One macro-tick: EE until the next scheduler event, the IOP at an
    /// eighth of that, timers, then the event drain.
    pub fn run_slice(&mut self) {
        let cycles = self.bus.scheduler.until_next_event();

        self.ee.step(&mut self.bus, cycles);

        let (ee_timers, intc) = (&mut self.bus.ee_timers, &mut self.bus.intc);
        ee_timers.step(cycles >> 1, intc);

        self.iop_residual += cycles;
        let iop_cycles = self.iop_residual >> 3;
        self.iop_residual &= 7;

        if iop_cycles > 0 {
            self.iop.step(&mut self.bus, iop_cycles);

            let (iop_timers, intc) = (&mut self.bus.iop_timers, &mut self.bus.intc);
            iop_timers.step(iop_cycles, intc);
        }

        self.bus.process_events(cycles);
    }

    pub fn run(&mut self) -> ! {
        loop {
            self.run_slice();
        }
    }
}

/// Rewrites the BIOS OSDSYS boot target inside EELOAD so the kernel boots
/// the disc's main executable directly.
pub fn fast_boot(bus: &mut Bus) {
    let path = bus.cdvd.exec_path();

    let needle = b"rom0:OSDSYS";

    let offset = bus.ram[EELOAD_START..EELOAD_END]
        .windows(needle.len())
        .position(|window| window == needle)
        .unwrap_or_else(|| panic!("[moestation] OSDSYS path not found in EELOAD"));

    let start = EELOAD_START + offset;
    bus.ram[start..start + path.len()].copy_from_slice(&path);

    tracing::info!(target: "moe_core::ps2", "fast boot: OSDSYS path patched @ {start:#X}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn temp_file(name: &str, contents: &[u8]) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("moe-ps2-test-{}-{name}", std::process::id()));

        std::fs::File::create(&path).unwrap().write_all(contents).unwrap();

        path
    }

    #[test]
    fn machine_boots_from_the_reset_vector() {
        let mut bios = vec![0u8; BIOS_SIZE];
        // lui t0, 0x1234 / nop spin
        bios[0..4].copy_from_slice(&0x3C08_1234u32.to_le_bytes());

        let bios_path = temp_file("bios.bin", &bios);

        let mut ps2 = Ps2::new(&bios_path, None).unwrap();
        ps2.run_slice();

        assert_eq!(ps2.ee.regs[8].lo, 0x1234_0000);
        assert_eq!(ps2.iop.pc & 0xFFF0_0000, 0xBFC0_0000);

        std::fs::remove_file(bios_path).ok();
    }

    #[test]
    fn missing_bios_is_a_config_error() {
        assert!(Ps2::new(Path::new("/nonexistent/bios.bin"), None).is_err());
    }

    #[test]
    fn fast_boot_patches_the_osdsys_path() {
        // Disc: SYSTEM.CNF-style BOOT2 line at the start of sector 3.
        let mut disc = vec![0u8; 2048 * 8];
        let boot2 = b"BOOT2 = cdrom0:\\SLUS_123.45;1";
        disc[2048 * 3..2048 * 3 + boot2.len()].copy_from_slice(boot2);

        let disc_path = temp_file("disc.iso", &disc);

        let mut bus =
            Bus::new(vec![0; BIOS_SIZE], Some(std::fs::File::open(&disc_path).unwrap()));

        // The kernel left its OSDSYS path inside EELOAD.
        let osdsys = b"rom0:OSDSYS\0\0\0\0\0\0\0\0\0\0\0\0";
        bus.ram[0x90000..0x90000 + osdsys.len()].copy_from_slice(osdsys);

        fast_boot(&mut bus);

        let patched = &bus.ram[0x90000..0x90000 + 23];
        assert_eq!(&patched[..9], b"cdrom0:\\\\");
        assert_eq!(&patched[9..20], b"SLUS_123.45");
        assert_eq!(&patched[20..22], b";1");

        std::fs::remove_file(disc_path).ok();
    }
}
