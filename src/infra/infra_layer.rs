// The infra module contains implementations of core traits.
// Each upstream service goes in its own submodule.

#[path = "brightspace/mod.rs"]
pub mod brightspace;

#[path = "amplify/mod.rs"]
pub mod amplify;
