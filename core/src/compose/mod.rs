// opkit/src/compose/mod.rs

//! Dynamic composition: embedding other operations as child scopes and
//! extending a scope from results produced while it runs.

pub mod defer;
pub mod embed;
pub mod source;

pub use embed::Embed;
pub use source::Source;
