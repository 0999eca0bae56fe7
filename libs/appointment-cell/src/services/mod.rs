pub mod booking;
pub mod capacity;
pub mod reappointment;
