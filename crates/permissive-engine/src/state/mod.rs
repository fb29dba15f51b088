pub mod atomic;
pub mod settings_file;
