//! Reading and writing volumes.

pub mod mha;
pub mod weights;

pub use self::mha::{MetaElement, read_mha, write_mha, write_mha_to};
pub use self::weights::{weight_file_name, write_weight_field, list_weight_files, read_weight_map};
