#[macro_use]
mod environment;
#[cfg(test)]
mod test_environment;

pub use environment::*;

#[cfg(test)]
pub use test_environment::*;
