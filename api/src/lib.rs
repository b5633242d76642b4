pub mod address;
pub mod amount;
pub mod block;
pub mod consts;
pub mod decode;
pub mod error;
pub mod sdk;
pub mod state;

pub mod prelude {
    pub use crate::address::*;
    pub use crate::amount::*;
    pub use crate::block::*;
    pub use crate::consts::*;
    pub use crate::error::*;
    pub use crate::sdk::{Contract, EntryFunctionPayload, Module, ModuleNames, ViewRequest};
    pub use crate::state::*;
}
