//! The built-in feature modules.

pub mod carry_weight;
pub mod day_length;
pub mod stamina;
pub mod trader_durability;
pub mod weapon_durability;

pub use carry_weight::CarryWeightModule;
pub use day_length::DayLengthModule;
pub use stamina::StaminaModule;
pub use trader_durability::TraderDurabilityModule;
pub use weapon_durability::WeaponDurabilityModule;
