pub mod assignments;
pub mod runs;
pub mod specs;
