// tests/common/mod.rs

#![allow(dead_code, unused_imports)]

pub use remote_bridge_test_utils::builders;
pub use remote_bridge_test_utils::fake_connector::{FakeConnector, OUTBOUND_CAPACITY};
pub use remote_bridge_test_utils::recording::{CountingListener, LoggedLine, RecordingSink};
pub use remote_bridge_test_utils::{init_tracing, with_timeout};
