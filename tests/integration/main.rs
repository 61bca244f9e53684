//! Integration test entry point.
//!
//! Single binary so the mock adapters are shared and the scenario tests
//! can serialise access to the ISR-shared statics (DCC command state,
//! encoder counter).

mod mock_hw;
mod scenario_tests;
