//! Driver table used to instantiate `[[component]]` entries.
//!
//! Maps the `kind` string of a component entry to a constructor. The default
//! registry carries the reference driver for every
//! [`ComponentKind`]; firmware-specific drivers can be added with
//! [`DriverRegistry::register`].

use std::collections::BTreeMap;

use cadence_core::component::drivers::{DaiDriver, EffectDriver, HostDriver, MixerDriver, ToneDriver};
use cadence_core::{ComponentDriver, ComponentKind, Direction};

/// Arguments handed to a driver constructor.
#[derive(Debug, Clone, Copy)]
pub struct DriverArgs<'a> {
    /// Component direction.
    pub direction: Direction,
    /// Integer parameters from the component entry.
    pub params: &'a BTreeMap<String, i64>,
}

impl DriverArgs<'_> {
    /// Looks up an integer parameter.
    pub fn param(&self, name: &str) -> Option<i64> {
        self.params.get(name).copied()
    }
}

/// Driver constructor.
pub type DriverCtor = fn(&DriverArgs<'_>) -> Box<dyn ComponentDriver>;

/// Registry entry.
#[derive(Debug, Clone, Copy)]
pub struct DriverDescriptor {
    /// Name used in topology files.
    pub name: &'static str,
    /// Kind of the drivers it builds.
    pub kind: ComponentKind,
    /// One-line description.
    pub description: &'static str,
    /// Parameters the constructor reads.
    pub params: &'static [&'static str],
    /// Constructor.
    pub create: DriverCtor,
}

/// Name-indexed table of driver constructors.
#[derive(Debug, Clone)]
pub struct DriverRegistry {
    drivers: BTreeMap<&'static str, DriverDescriptor>,
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverRegistry {
    /// Creates a registry with the reference drivers.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        for descriptor in REFERENCE_DRIVERS {
            registry.register(*descriptor);
        }
        registry
    }

    /// Creates a registry with no drivers.
    pub fn empty() -> Self {
        Self {
            drivers: BTreeMap::new(),
        }
    }

    /// Adds or replaces a driver.
    pub fn register(&mut self, descriptor: DriverDescriptor) {
        self.drivers.insert(descriptor.name, descriptor);
    }

    /// Looks up a driver by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&DriverDescriptor> {
        self.drivers
            .values()
            .find(|d| d.name.eq_ignore_ascii_case(name))
    }

    /// Builds a driver, or `None` if the name is unknown.
    pub fn create(&self, name: &str, args: &DriverArgs<'_>) -> Option<Box<dyn ComponentDriver>> {
        self.get(name).map(|d| (d.create)(args))
    }

    /// All registered drivers, by name.
    pub fn all(&self) -> impl Iterator<Item = &DriverDescriptor> {
        self.drivers.values()
    }

    /// Number of registered drivers.
    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    /// True when no driver is registered.
    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

fn clamp_i32(value: i64) -> i32 {
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

const REFERENCE_DRIVERS: &[DriverDescriptor] = &[
    DriverDescriptor {
        name: "host",
        kind: ComponentKind::Host,
        description: "Simulated host DMA endpoint",
        params: &[],
        create: |args| Box::new(HostDriver::new(args.direction)),
    },
    DriverDescriptor {
        name: "dai",
        kind: ComponentKind::Dai,
        description: "Simulated hardware interface, reports xruns as no-data",
        params: &[],
        create: |args| Box::new(DaiDriver::new(args.direction)),
    },
    DriverDescriptor {
        name: "effect",
        kind: ComponentKind::Effect,
        description: "Passthrough with volume in percent",
        params: &["volume"],
        create: |args| match args.param("volume") {
            Some(volume) => Box::new(EffectDriver::with_volume(clamp_i32(volume))),
            None => Box::new(EffectDriver::new()),
        },
    },
    DriverDescriptor {
        name: "mixer",
        kind: ComponentKind::Mixer,
        description: "Sums every source into one sink",
        params: &[],
        create: |_| Box::new(MixerDriver::new()),
    },
    DriverDescriptor {
        name: "tone",
        kind: ComponentKind::Tone,
        description: "Square wave generator",
        params: &["amplitude", "half_cycle"],
        create: |args| {
            let default = ToneDriver::default();
            let amplitude = args.param("amplitude").map_or(default.amplitude(), clamp_i32);
            let half_cycle = args
                .param("half_cycle")
                .map_or(default.half_cycle(), |v| v.clamp(1, i64::from(u32::MAX)) as u32);
            Box::new(ToneDriver::new(amplitude, half_cycle))
        },
    },
];
