pub mod test_broadcast_stop_teardown;
pub mod test_listener_failure_isolation;
pub mod test_offer_timeout_retry;
