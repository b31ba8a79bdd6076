//! Voltage tiers, machine coefficient profiles and the overclock law.
//!
//! A recipe's crafter decides how many parallels it runs, how fast and how
//! much power it draws, and how many of its overclocks are "perfect" (4x
//! speed for 4x power instead of 2x speed). Profiles are authored here per
//! crafter name; a crafter without one behaves like a plain single-block.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Saved choice values of a recipe node, keyed by choice name.
pub type Choices = BTreeMap<String, f64>;

/// Discrete power rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum VoltageTier {
    ULV,
    #[default]
    LV,
    MV,
    HV,
    EV,
    IV,
    LuV,
    ZPM,
    UV,
    UHV,
    UEV,
    UIV,
    UMV,
    UXV,
    MAX,
}

const TIERS: [VoltageTier; 15] = [
    VoltageTier::ULV,
    VoltageTier::LV,
    VoltageTier::MV,
    VoltageTier::HV,
    VoltageTier::EV,
    VoltageTier::IV,
    VoltageTier::LuV,
    VoltageTier::ZPM,
    VoltageTier::UV,
    VoltageTier::UHV,
    VoltageTier::UEV,
    VoltageTier::UIV,
    VoltageTier::UMV,
    VoltageTier::UXV,
    VoltageTier::MAX,
];

impl VoltageTier {
    pub fn all() -> &'static [VoltageTier] {
        &TIERS
    }

    pub fn from_index(index: usize) -> Option<VoltageTier> {
        TIERS.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Maximum EU/t of one amp at this tier: `8 * 4^tier`.
    ///
    /// ```
    /// use gtplanner::machines::VoltageTier;
    ///
    /// assert_eq!(VoltageTier::LV.voltage(), 32.0);
    /// assert_eq!(VoltageTier::HV.voltage(), 512.0);
    /// ```
    pub fn voltage(self) -> f64 {
        8.0 * 4f64.powi(self.index() as i32)
    }

    pub fn name(self) -> &'static str {
        match self {
            VoltageTier::ULV => "ULV",
            VoltageTier::LV => "LV",
            VoltageTier::MV => "MV",
            VoltageTier::HV => "HV",
            VoltageTier::EV => "EV",
            VoltageTier::IV => "IV",
            VoltageTier::LuV => "LuV",
            VoltageTier::ZPM => "ZPM",
            VoltageTier::UV => "UV",
            VoltageTier::UHV => "UHV",
            VoltageTier::UEV => "UEV",
            VoltageTier::UIV => "UIV",
            VoltageTier::UMV => "UMV",
            VoltageTier::UXV => "UXV",
            VoltageTier::MAX => "MAX",
        }
    }
}

impl fmt::Display for VoltageTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for VoltageTier {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        VoltageTier::from_index(value as usize).ok_or_else(|| format!("invalid voltage tier {value}"))
    }
}

impl From<VoltageTier> for u8 {
    fn from(tier: VoltageTier) -> u8 {
        tier.index() as u8
    }
}

/// What a coefficient function can see about the recipe being run.
#[derive(Debug, Clone, Copy)]
pub struct MachineContext {
    /// Tier the user selected for the node.
    pub tier: VoltageTier,
    /// Minimum tier of the recipe.
    pub recipe_tier: u32,
    /// Base EU/t of the recipe.
    pub recipe_voltage: f64,
}

pub type CoefficientFn = fn(&MachineContext, &Choices) -> f64;

/// A machine coefficient: a constant or a function of the context and choices.
#[derive(Debug, Clone, Copy)]
pub enum Coefficient {
    Constant(f64),
    Computed(CoefficientFn),
}

impl Coefficient {
    pub fn evaluate(&self, context: &MachineContext, choices: &Choices) -> f64 {
        match self {
            Coefficient::Constant(value) => *value,
            Coefficient::Computed(f) => f(context, choices),
        }
    }
}

/// A user-tunable machine parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineChoice {
    pub key: &'static str,
    pub description: &'static str,
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

/// Evaluated coefficients for one recipe node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MachineCoefficients {
    pub parallels: f64,
    pub power: f64,
    pub speed: f64,
    pub perfect_overclocks: f64,
}

impl Default for MachineCoefficients {
    fn default() -> Self {
        MachineCoefficients {
            parallels: 1.0,
            power: 1.0,
            speed: 1.0,
            perfect_overclocks: 0.0,
        }
    }
}

/// Coefficient profile of one crafter.
#[derive(Debug, Clone)]
pub struct MachineProfile {
    pub name: String,
    pub parallels: Coefficient,
    pub power: Coefficient,
    pub speed: Coefficient,
    pub perfect_overclocks: Coefficient,
    pub choices: Vec<MachineChoice>,
}

impl MachineProfile {
    /// Plain single-block behavior: one parallel, no bonuses.
    pub fn basic() -> MachineProfile {
        MachineProfile {
            name: "Single Block".to_string(),
            parallels: Coefficient::Constant(1.0),
            power: Coefficient::Constant(1.0),
            speed: Coefficient::Constant(1.0),
            perfect_overclocks: Coefficient::Constant(0.0),
            choices: Vec::new(),
        }
    }

    /// Fills missing choices with defaults and clamps saved ones into range.
    pub fn resolve_choices(&self, saved: &Choices) -> Choices {
        let mut resolved = saved.clone();
        for choice in &self.choices {
            let value = saved
                .get(choice.key)
                .copied()
                .filter(|v| v.is_finite())
                .unwrap_or(choice.default);
            resolved.insert(choice.key.to_string(), value.clamp(choice.min, choice.max));
        }
        resolved
    }

    pub fn evaluate(&self, context: &MachineContext, saved: &Choices) -> MachineCoefficients {
        let choices = self.resolve_choices(saved);
        MachineCoefficients {
            parallels: self.parallels.evaluate(context, &choices),
            power: self.power.evaluate(context, &choices),
            speed: self.speed.evaluate(context, &choices),
            perfect_overclocks: self.perfect_overclocks.evaluate(context, &choices),
        }
    }
}

/// Machine profiles keyed by crafter name.
#[derive(Debug, Clone)]
pub struct MachineRegistry {
    profiles: HashMap<String, MachineProfile>,
    basic: MachineProfile,
}

impl Default for MachineRegistry {
    fn default() -> Self {
        MachineRegistry::with_defaults()
    }
}

const COIL_HEAT: MachineChoice = MachineChoice {
    key: "heatSurplus",
    description: "Coil heat above the recipe's required heat (K)",
    min: 0.0,
    max: 20000.0,
    default: 0.0,
};

fn heat_perfect_overclocks(_: &MachineContext, choices: &Choices) -> f64 {
    (choices.get(COIL_HEAT.key).copied().unwrap_or(0.0) / 1800.0).floor()
}

fn heat_power_discount(_: &MachineContext, choices: &Choices) -> f64 {
    let steps = (choices.get(COIL_HEAT.key).copied().unwrap_or(0.0) / 900.0).floor();
    0.95f64.powf(steps)
}

fn processing_array_parallels(_: &MachineContext, choices: &Choices) -> f64 {
    choices.get("machines").copied().unwrap_or(1.0).floor()
}

fn tier_scaled_parallels(context: &MachineContext, _: &Choices) -> f64 {
    6.0 * (context.tier.index() as f64 + 1.0)
}

impl MachineRegistry {
    /// A registry with no authored profiles.
    pub fn empty() -> MachineRegistry {
        MachineRegistry {
            profiles: HashMap::new(),
            basic: MachineProfile::basic(),
        }
    }

    /// The authored multiblock profiles.
    pub fn with_defaults() -> MachineRegistry {
        let mut registry = MachineRegistry::empty();
        registry.register(MachineProfile {
            name: "Large Chemical Reactor".to_string(),
            perfect_overclocks: Coefficient::Constant(f64::INFINITY),
            ..MachineProfile::basic()
        });
        registry.register(MachineProfile {
            name: "Electric Blast Furnace".to_string(),
            power: Coefficient::Computed(heat_power_discount),
            perfect_overclocks: Coefficient::Computed(heat_perfect_overclocks),
            choices: vec![COIL_HEAT],
            ..MachineProfile::basic()
        });
        registry.register(MachineProfile {
            name: "Volcanus".to_string(),
            parallels: Coefficient::Constant(8.0),
            speed: Coefficient::Constant(2.2),
            power: Coefficient::Computed(|context, choices| {
                0.9 * heat_power_discount(context, choices)
            }),
            perfect_overclocks: Coefficient::Computed(heat_perfect_overclocks),
            choices: vec![COIL_HEAT],
        });
        registry.register(MachineProfile {
            name: "Processing Array".to_string(),
            parallels: Coefficient::Computed(processing_array_parallels),
            choices: vec![MachineChoice {
                key: "machines",
                description: "Machines inside the array",
                min: 1.0,
                max: 64.0,
                default: 16.0,
            }],
            ..MachineProfile::basic()
        });
        registry.register(MachineProfile {
            name: "Industrial Centrifuge".to_string(),
            parallels: Coefficient::Computed(tier_scaled_parallels),
            speed: Coefficient::Constant(2.25),
            power: Coefficient::Constant(0.9),
            ..MachineProfile::basic()
        });
        registry
    }

    pub fn register(&mut self, profile: MachineProfile) {
        self.profiles.insert(profile.name.clone(), profile);
    }

    pub fn get(&self, crafter_name: &str) -> Option<&MachineProfile> {
        self.profiles.get(crafter_name)
    }

    /// The crafter's profile, or the basic single-block profile.
    pub fn profile_for(&self, crafter_name: &str) -> &MachineProfile {
        self.profiles.get(crafter_name).unwrap_or(&self.basic)
    }
}

/// `4^perfect * 2^normal * speed * parallels`
///
/// ```
/// use gtplanner::machines::overclock_factor;
///
/// assert_eq!(overclock_factor(2, 1, 1.0, 3.0), 96.0);
/// ```
pub fn overclock_factor(perfect: u32, normal: u32, speed: f64, parallels: f64) -> f64 {
    4f64.powi(perfect as i32) * 2f64.powi(normal as i32) * speed * parallels
}

/// `2^normal * power / speed`
pub fn power_factor(normal: u32, power: f64, speed: f64) -> f64 {
    2f64.powi(normal as i32) * power / speed
}

/// Parallels and overclocks of one recipe node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Overclock {
    pub max_parallels: f64,
    pub parallels: f64,
    pub perfect_overclocks: u32,
    pub normal_overclocks: u32,
    pub overclock_factor: f64,
    pub power_factor: f64,
    /// The selected tier cannot supply even one parallel.
    pub underpowered: bool,
}

impl Overclock {
    /// No overclocking at all (instant recipes).
    pub fn none() -> Overclock {
        Overclock {
            max_parallels: 1.0,
            parallels: 1.0,
            perfect_overclocks: 0,
            normal_overclocks: 0,
            overclock_factor: 1.0,
            power_factor: 1.0,
            underpowered: false,
        }
    }

    /// Applies the overclock law for a recipe run at `tier`.
    pub fn compute(
        tier: VoltageTier,
        recipe_voltage: f64,
        amperage: f64,
        recipe_tier: u32,
        coefficients: &MachineCoefficients,
    ) -> Overclock {
        let speed = if coefficients.speed > 0.0 { coefficients.speed } else { 1.0 };
        let cap = coefficients.parallels.floor().max(1.0);
        let draw = recipe_voltage * coefficients.power * amperage.max(1.0);

        let max_parallels = if draw > 0.0 {
            (tier.voltage() / draw).floor()
        } else {
            cap
        };
        let underpowered = max_parallels < 1.0;
        let parallels = cap.min(max_parallels).max(1.0);

        let headroom = (tier.index() as i64 - i64::from(recipe_tier)).max(0) as u32;
        let spare = if draw > 0.0 && max_parallels > parallels {
            ((max_parallels / parallels).log2() / 2.0).floor().max(0.0) as u32
        } else {
            0
        };
        let overclocks = headroom.min(spare);
        let allowance = coefficients.perfect_overclocks.floor().max(0.0) as u32;
        let perfect = allowance.min(overclocks);
        let normal = overclocks - perfect;

        Overclock {
            max_parallels,
            parallels,
            perfect_overclocks: perfect,
            normal_overclocks: normal,
            overclock_factor: overclock_factor(perfect, normal, speed, parallels),
            power_factor: power_factor(normal, coefficients.power, speed),
            underpowered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(tier: VoltageTier) -> MachineContext {
        MachineContext {
            tier,
            recipe_tier: 1,
            recipe_voltage: 30.0,
        }
    }

    #[test]
    fn test_tier_serde_as_index() {
        let json = serde_json::to_string(&VoltageTier::HV).unwrap();
        assert_eq!(json, "3");
        let tier: VoltageTier = serde_json::from_str("5").unwrap();
        assert_eq!(tier, VoltageTier::IV);
        assert!(serde_json::from_str::<VoltageTier>("42").is_err());
    }

    #[test]
    fn test_resolve_choices_defaults_and_clamps() {
        let registry = MachineRegistry::with_defaults();
        let array = registry.profile_for("Processing Array");

        let resolved = array.resolve_choices(&Choices::new());
        assert_eq!(resolved.get("machines"), Some(&16.0));

        let mut saved = Choices::new();
        saved.insert("machines".to_string(), 500.0);
        assert_eq!(array.resolve_choices(&saved).get("machines"), Some(&64.0));
    }

    #[test]
    fn test_unknown_crafter_falls_back_to_basic() {
        let registry = MachineRegistry::with_defaults();
        let profile = registry.profile_for("Macerator");
        let coefficients = profile.evaluate(&context(VoltageTier::LV), &Choices::new());
        assert_eq!(coefficients, MachineCoefficients::default());
    }

    #[test]
    fn test_computed_coefficients() {
        let registry = MachineRegistry::with_defaults();
        let mut choices = Choices::new();
        choices.insert("heatSurplus".to_string(), 3600.0);
        let ebf = registry
            .profile_for("Electric Blast Furnace")
            .evaluate(&context(VoltageTier::HV), &choices);
        assert_eq!(ebf.perfect_overclocks, 2.0);
        assert!((ebf.power - 0.95f64.powi(4)).abs() < 1e-12);

        let centrifuge = registry
            .profile_for("Industrial Centrifuge")
            .evaluate(&context(VoltageTier::MV), &Choices::new());
        assert_eq!(centrifuge.parallels, 18.0);
    }

    #[test]
    fn test_single_block_overclock() {
        // 30 EU/t LV recipe run at HV: 512 / 30 = 17 parallels worth of power,
        // one parallel, so two overclocks of headroom (log2(17) / 2 = 2.04).
        let oc = Overclock::compute(VoltageTier::HV, 30.0, 1.0, 1, &MachineCoefficients::default());
        assert_eq!(oc.max_parallels, 17.0);
        assert_eq!(oc.parallels, 1.0);
        assert_eq!(oc.perfect_overclocks, 0);
        assert_eq!(oc.normal_overclocks, 2);
        assert_eq!(oc.overclock_factor, 4.0);
        assert_eq!(oc.power_factor, 4.0);
    }

    #[test]
    fn test_overclock_limited_by_headroom() {
        // ULV-power recipe that is nominally an HV recipe: no tier headroom at HV.
        let oc = Overclock::compute(VoltageTier::HV, 8.0, 1.0, 3, &MachineCoefficients::default());
        assert_eq!(oc.normal_overclocks + oc.perfect_overclocks, 0);
        assert_eq!(oc.overclock_factor, 1.0);
    }

    #[test]
    fn test_perfect_overclocks_take_priority() {
        let coefficients = MachineCoefficients {
            perfect_overclocks: f64::INFINITY,
            ..MachineCoefficients::default()
        };
        let oc = Overclock::compute(VoltageTier::EV, 30.0, 1.0, 1, &coefficients);
        // 2048 / 30 = 68 -> log2(68) / 2 = 3.04 -> 3 overclocks, all perfect
        assert_eq!(oc.perfect_overclocks, 3);
        assert_eq!(oc.normal_overclocks, 0);
        assert_eq!(oc.overclock_factor, 64.0);
        assert_eq!(oc.power_factor, 1.0);
    }

    #[test]
    fn test_parallels_consume_power_budget() {
        let coefficients = MachineCoefficients {
            parallels: 4.0,
            ..MachineCoefficients::default()
        };
        // 512 / 30 = 17 available, 4 used, 17 / 4 = 4.25 -> one overclock
        let oc = Overclock::compute(VoltageTier::HV, 30.0, 1.0, 1, &coefficients);
        assert_eq!(oc.parallels, 4.0);
        assert_eq!(oc.normal_overclocks, 1);
        assert_eq!(oc.overclock_factor, 8.0);
    }

    #[test]
    fn test_underpowered_recipe() {
        let oc = Overclock::compute(VoltageTier::LV, 120.0, 1.0, 2, &MachineCoefficients::default());
        assert!(oc.underpowered);
        assert_eq!(oc.parallels, 1.0);
        assert_eq!(oc.overclock_factor, 1.0);
    }
}
