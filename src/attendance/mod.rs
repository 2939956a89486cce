pub mod streak;
pub mod tracker;

pub use streak::{attendance_rate, compute_streak, month_calendar, recent_attendance};
pub use tracker::{
    handle_mode_change, is_recharge, register_automatic, toggle_manual,
};
