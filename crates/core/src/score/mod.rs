//! Matching, planning, assembly and mixing.

pub mod assembler;
pub mod matcher;
pub mod mixer;
pub mod planner;
