//! Constants used in the plastic-hub crate.

/// Logger target for general hub logging
pub const ROOT_LOGGER_NAME: &str = "plastic_hub";

/// Logger target for structured hub events
pub const EVENT_LOGGER_NAME: &str = "plastic_hub::events";

/// Logger target for message validation warnings
pub const VALIDATION_LOGGER_NAME: &str = "plastic_hub::validation";

/// Prefix of every hub operation name on the wire transports
pub const HUB_METHOD_PREFIX: &str = "plastic.hub.";

/// Version of the PLASTIC protocol implemented
pub const PLASTIC_VERSION: &str = "0.4";
