pub mod layout;
pub mod package;
pub mod render;
pub mod xml;

#[cfg(test)]
pub(crate) mod testutil;
