//! Item commands

mod add;
mod delete;
mod mv;
mod set_status;

pub use add::AddItem;
pub use delete::DeleteItem;
pub use mv::MoveItem;
pub use set_status::SetItemStatus;
