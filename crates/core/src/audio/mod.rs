pub mod buffer;
pub mod gain;
pub mod io;
