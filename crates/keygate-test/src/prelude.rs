//! Prelude module - commonly used types for convenient import.
//!
//! Use `use keygate_test::prelude::*;` to import all essential types.

// Mocks
pub use crate::{Erc20ThresholdExecutor, MockChainReader, MockPredicateExecutor};

// Fixtures
pub use crate::{
    TEST_CID, test_address, test_chain, test_code_ref, test_key, test_key_address, test_restriction,
    test_scope, test_signer,
};

pub use crate::init_test_logging;
