/// Common test utilities for the integration tests
///
/// - mock_device: tempfile-backed image files
/// - test_helpers: content checks on image files
/// - probes: scripted signature probes

pub mod mock_device;
pub mod probes;
pub mod test_helpers;
