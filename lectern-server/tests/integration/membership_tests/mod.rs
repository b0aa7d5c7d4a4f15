pub mod test_broadcaster_leave;
pub mod test_listener_waits_until_live;
pub mod test_rapid_rejoin;
