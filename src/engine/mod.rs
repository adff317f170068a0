pub mod entity;
pub mod persister;
pub mod work_unit;

pub use entity::{Entity, FieldState};
pub use persister::Persister;
pub use work_unit::{UnitTarget, WorkUnit, WorkUnitKind};
