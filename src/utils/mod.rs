pub mod dataset_path;
pub mod feature_flags;
pub mod paths;
