mod exit_status_sentinel;
pub mod page;

pub(crate) use exit_status_sentinel::check;
