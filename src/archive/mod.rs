//! Archive handling — signature probing and scratch zip creation.

pub mod probe;
pub mod scratch;
