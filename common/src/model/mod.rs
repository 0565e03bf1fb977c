pub mod binding;
pub mod change_log;
pub mod overview;
