//! Reference drivers for each [`ComponentKind`].
//!
//! These stand in for real hardware and DSP: the host and DAI endpoints move
//! bytes in and out of simulated memory and count them, the effect scales
//! samples by a volume control, the mixer sums its sources and the tone
//! generator writes a square wave. Samples are treated as signed bytes; real
//! format conversion is a driver concern outside the core.
//!
//! Every driver moves at most `period_bytes` per copy once params have been
//! negotiated, and "as much as fits" before that.

use crate::buffer::StreamParams;
use crate::component::{ComponentDriver, ComponentKind, ControlCmd, Direction, Ports, TriggerCmd};
use crate::error::{Error, Result, Status};

/// Bytes to move this tick given the per-period budget and what the buffers allow.
#[inline]
fn chunk(period_bytes: usize, limit: usize) -> usize {
    if period_bytes == 0 {
        limit
    } else {
        period_bytes.min(limit)
    }
}

/// Grows `scratch` to at least `len` bytes. Only allocates before the first
/// tick at a new period size.
#[inline]
fn scratch_for(scratch: &mut Vec<u8>, len: usize) -> &mut [u8] {
    if scratch.len() < len {
        scratch.resize(len, 0);
    }
    &mut scratch[..len]
}

#[inline]
fn scale(sample: u8, volume: i32) -> u8 {
    let scaled = i32::from(sample as i8) * volume / 100;
    scaled.clamp(i32::from(i8::MIN), i32::from(i8::MAX)) as i8 as u8
}

/// Host DMA endpoint.
///
/// Playback hosts produce a byte ramp into their first sink; capture hosts
/// drain their first source. Either way the byte count is the host position.
#[derive(Debug, Default)]
pub struct HostDriver {
    direction: Direction,
    period_bytes: usize,
    position: u64,
    ramp: u8,
    scratch: Vec<u8>,
}

impl HostDriver {
    /// Creates a host endpoint for `direction`.
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            ..Self::default()
        }
    }
}

impl ComponentDriver for HostDriver {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Host
    }

    fn params(&mut self, _params: &StreamParams, period_bytes: usize) -> Result<()> {
        self.period_bytes = period_bytes;
        self.scratch.resize(period_bytes, 0);
        Ok(())
    }

    fn copy(&mut self, ports: &Ports<'_>) -> Result<Status> {
        match self.direction {
            Direction::Playback => {
                let Some(sink) = ports.sink(0) else {
                    return Ok(Status::Continue);
                };
                let n = chunk(self.period_bytes, sink.free_bytes());
                let data = scratch_for(&mut self.scratch, n);
                for byte in data.iter_mut() {
                    *byte = self.ramp;
                    self.ramp = self.ramp.wrapping_add(1);
                }
                sink.write(data);
                sink.produce(n);
                self.position += n as u64;
            }
            Direction::Capture => {
                let Some(source) = ports.source(0) else {
                    return Ok(Status::Continue);
                };
                let n = chunk(self.period_bytes, source.avail_bytes());
                source.read(scratch_for(&mut self.scratch, n));
                source.consume(n);
                self.position += n as u64;
            }
        }
        Ok(Status::Continue)
    }

    fn reset(&mut self) -> Result<()> {
        self.position = 0;
        self.ramp = 0;
        Ok(())
    }

    fn position(&self) -> Option<u64> {
        Some(self.position)
    }
}

/// Hardware digital audio interface endpoint.
///
/// A playback DAI needs a full period in its source every tick, a capture DAI
/// needs a full period of room in its sink. Anything less is an xrun,
/// reported as [`Error::NoData`].
#[derive(Debug, Default)]
pub struct DaiDriver {
    direction: Direction,
    period_bytes: usize,
    position: u64,
    running: bool,
    xruns: u64,
    scratch: Vec<u8>,
}

impl DaiDriver {
    /// Creates a DAI endpoint for `direction`.
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            ..Self::default()
        }
    }

    /// Underruns (playback) or overruns (capture) seen so far.
    pub fn xruns(&self) -> u64 {
        self.xruns
    }

    /// True between START/RELEASE and STOP/PAUSE/RESET.
    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl ComponentDriver for DaiDriver {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Dai
    }

    fn params(&mut self, _params: &StreamParams, period_bytes: usize) -> Result<()> {
        self.period_bytes = period_bytes;
        self.scratch.resize(period_bytes, 0);
        Ok(())
    }

    fn trigger(&mut self, cmd: TriggerCmd) -> Result<Status> {
        self.running = matches!(cmd, TriggerCmd::Start | TriggerCmd::Release);
        Ok(Status::Continue)
    }

    fn copy(&mut self, ports: &Ports<'_>) -> Result<Status> {
        match self.direction {
            Direction::Playback => {
                let Some(source) = ports.source(0) else {
                    return Ok(Status::Continue);
                };
                let avail = source.avail_bytes();
                if avail < self.period_bytes {
                    self.xruns += 1;
                    tracing::warn!(
                        "dai_copy: underrun, {avail} bytes available, {} needed",
                        self.period_bytes
                    );
                    return Err(Error::NoData);
                }
                let n = chunk(self.period_bytes, avail);
                source.read(scratch_for(&mut self.scratch, n));
                source.consume(n);
                self.position += n as u64;
            }
            Direction::Capture => {
                let Some(sink) = ports.sink(0) else {
                    return Ok(Status::Continue);
                };
                let free = sink.free_bytes();
                if free < self.period_bytes {
                    self.xruns += 1;
                    tracing::warn!(
                        "dai_copy: overrun, {free} bytes free, {} needed",
                        self.period_bytes
                    );
                    return Err(Error::NoData);
                }
                let n = chunk(self.period_bytes, free);
                let data = scratch_for(&mut self.scratch, n);
                data.fill(0);
                sink.write(data);
                sink.produce(n);
                self.position += n as u64;
            }
        }
        Ok(Status::Continue)
    }

    fn reset(&mut self) -> Result<()> {
        self.position = 0;
        self.running = false;
        Ok(())
    }

    fn position(&self) -> Option<u64> {
        Some(self.position)
    }
}

/// Passthrough stage with a volume control (percent, `0..=100`).
///
/// Control index `0` is the volume.
#[derive(Debug)]
pub struct EffectDriver {
    volume: i32,
    period_bytes: usize,
    scratch: Vec<u8>,
}

impl EffectDriver {
    /// Unity-gain passthrough.
    pub fn new() -> Self {
        Self::with_volume(100)
    }

    /// Passthrough at `volume` percent.
    pub fn with_volume(volume: i32) -> Self {
        Self {
            volume: volume.clamp(0, 100),
            period_bytes: 0,
            scratch: Vec::new(),
        }
    }

    /// Current volume in percent.
    pub fn volume(&self) -> i32 {
        self.volume
    }
}

impl Default for EffectDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentDriver for EffectDriver {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Effect
    }

    fn params(&mut self, _params: &StreamParams, period_bytes: usize) -> Result<()> {
        self.period_bytes = period_bytes;
        self.scratch.resize(period_bytes, 0);
        Ok(())
    }

    fn copy(&mut self, ports: &Ports<'_>) -> Result<Status> {
        let (Some(source), Some(sink)) = (ports.source(0), ports.sink(0)) else {
            return Ok(Status::Continue);
        };
        let n = chunk(self.period_bytes, crate::buffer::copy_bytes(source, sink));
        let data = scratch_for(&mut self.scratch, n);
        source.read(data);
        if self.volume != 100 {
            for byte in data.iter_mut() {
                *byte = scale(*byte, self.volume);
            }
        }
        sink.write(data);
        source.consume(n);
        sink.produce(n);
        Ok(Status::Continue)
    }

    fn cmd(&mut self, cmd: ControlCmd) -> Result<i32> {
        match cmd {
            ControlCmd::Set { index: 0, value } if (0..=100).contains(&value) => {
                self.volume = value;
                Ok(value)
            }
            ControlCmd::Get { index: 0 } => Ok(self.volume),
            _ => Err(Error::InvalidArgument),
        }
    }
}

/// Fan-in stage: sums all sources into the first sink with saturation.
#[derive(Debug, Default)]
pub struct MixerDriver {
    period_bytes: usize,
    scratch: Vec<u8>,
    accum: Vec<i16>,
}

impl MixerDriver {
    /// Creates a mixer.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ComponentDriver for MixerDriver {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Mixer
    }

    fn params(&mut self, _params: &StreamParams, period_bytes: usize) -> Result<()> {
        self.period_bytes = period_bytes;
        self.scratch.resize(period_bytes, 0);
        self.accum.resize(period_bytes, 0);
        Ok(())
    }

    fn copy(&mut self, ports: &Ports<'_>) -> Result<Status> {
        let Some(sink) = ports.sink(0) else {
            return Ok(Status::Continue);
        };
        let limit = ports
            .sources()
            .map(|source| source.avail_bytes())
            .min()
            .unwrap_or(0)
            .min(sink.free_bytes());
        let n = chunk(self.period_bytes, limit);
        if n == 0 {
            return Ok(Status::Continue);
        }

        if self.accum.len() < n {
            self.accum.resize(n, 0);
        }
        self.accum[..n].fill(0);
        for source in ports.sources() {
            let data = scratch_for(&mut self.scratch, n);
            source.read(data);
            for (acc, &byte) in self.accum.iter_mut().zip(data.iter()) {
                *acc += i16::from(byte as i8);
            }
            source.consume(n);
        }

        let out = scratch_for(&mut self.scratch, n);
        for (byte, &acc) in out.iter_mut().zip(self.accum.iter()) {
            *byte = acc.clamp(i16::from(i8::MIN), i16::from(i8::MAX)) as i8 as u8;
        }
        sink.write(out);
        sink.produce(n);
        Ok(Status::Continue)
    }
}

/// Square-wave generator.
///
/// Control index `0` is the amplitude (`0..=127`), index `1` the half-cycle
/// length in bytes.
#[derive(Debug)]
pub struct ToneDriver {
    amplitude: i32,
    half_cycle: u32,
    phase: u32,
    period_bytes: usize,
    scratch: Vec<u8>,
}

impl ToneDriver {
    /// Creates a generator with the given amplitude and half-cycle length.
    pub fn new(amplitude: i32, half_cycle: u32) -> Self {
        Self {
            amplitude: amplitude.clamp(0, 127),
            half_cycle: half_cycle.max(1),
            phase: 0,
            period_bytes: 0,
            scratch: Vec::new(),
        }
    }

    /// Peak value of the wave.
    pub fn amplitude(&self) -> i32 {
        self.amplitude
    }

    /// Bytes per half cycle.
    pub fn half_cycle(&self) -> u32 {
        self.half_cycle
    }
}

impl Default for ToneDriver {
    fn default() -> Self {
        Self::new(64, 24)
    }
}

impl ComponentDriver for ToneDriver {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Tone
    }

    fn params(&mut self, _params: &StreamParams, period_bytes: usize) -> Result<()> {
        self.period_bytes = period_bytes;
        self.scratch.resize(period_bytes, 0);
        Ok(())
    }

    fn copy(&mut self, ports: &Ports<'_>) -> Result<Status> {
        let Some(sink) = ports.sink(0) else {
            return Ok(Status::Continue);
        };
        let n = chunk(self.period_bytes, sink.free_bytes());
        let high = self.amplitude as i8 as u8;
        let low = (-self.amplitude) as i8 as u8;
        let data = scratch_for(&mut self.scratch, n);
        for byte in data.iter_mut() {
            *byte = if (self.phase / self.half_cycle) % 2 == 0 { high } else { low };
            self.phase = (self.phase + 1) % (self.half_cycle * 2);
        }
        sink.write(data);
        sink.produce(n);
        Ok(Status::Continue)
    }

    fn reset(&mut self) -> Result<()> {
        self.phase = 0;
        Ok(())
    }

    fn cmd(&mut self, cmd: ControlCmd) -> Result<i32> {
        match cmd {
            ControlCmd::Set { index: 0, value } if (0..=127).contains(&value) => {
                self.amplitude = value;
                Ok(value)
            }
            ControlCmd::Set { index: 1, value } if value > 0 => {
                self.half_cycle = value as u32;
                self.phase = 0;
                Ok(value)
            }
            ControlCmd::Get { index: 0 } => Ok(self.amplitude),
            ControlCmd::Get { index: 1 } => Ok(self.half_cycle as i32),
            _ => Err(Error::InvalidArgument),
        }
    }
}

/// Builds the reference driver for `kind`.
pub fn reference_driver(kind: ComponentKind, direction: Direction) -> Box<dyn ComponentDriver> {
    match kind {
        ComponentKind::Host => Box::new(HostDriver::new(direction)),
        ComponentKind::Dai => Box::new(DaiDriver::new(direction)),
        ComponentKind::Effect => Box::new(EffectDriver::new()),
        ComponentKind::Mixer => Box::new(MixerDriver::new()),
        ComponentKind::Tone => Box::new(ToneDriver::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_halves_and_saturates() {
        assert_eq!(scale(100, 50) as i8, 50);
        assert_eq!(scale((-100i8) as u8, 50) as i8, -50);
        assert_eq!(scale(7, 0), 0);
    }

    #[test]
    fn chunk_respects_period() {
        assert_eq!(chunk(0, 40), 40);
        assert_eq!(chunk(16, 40), 16);
        assert_eq!(chunk(16, 8), 8);
    }

    #[test]
    fn effect_volume_control() {
        let mut fx = EffectDriver::new();
        assert_eq!(fx.cmd(ControlCmd::Set { index: 0, value: 40 }), Ok(40));
        assert_eq!(fx.cmd(ControlCmd::Get { index: 0 }), Ok(40));
        assert_eq!(fx.cmd(ControlCmd::Set { index: 0, value: 140 }), Err(Error::InvalidArgument));
        assert_eq!(fx.cmd(ControlCmd::Get { index: 3 }), Err(Error::InvalidArgument));
    }

    #[test]
    fn dai_tracks_running_state() {
        let mut dai = DaiDriver::new(Direction::Playback);
        dai.trigger(TriggerCmd::Start).unwrap();
        assert!(dai.is_running());
        dai.trigger(TriggerCmd::Pause).unwrap();
        assert!(!dai.is_running());
    }

    #[test]
    fn reference_driver_kinds_match() {
        for kind in ComponentKind::ALL {
            assert_eq!(reference_driver(kind, Direction::Playback).kind(), kind);
        }
    }
}
