//! Column commands

mod add;
mod delete;
mod reorder;
mod set_ruler;

pub use add::AddColumn;
pub use delete::DeleteColumn;
pub use reorder::ReorderColumn;
pub use set_ruler::SetRulerColumn;
