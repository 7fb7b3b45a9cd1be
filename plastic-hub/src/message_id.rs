//! Well-known PLASTIC message identifiers

use crate::identifier::Identifier;
use once_cell::sync::Lazy;

macro_rules! message_ids {
    ($($(#[$doc:meta])* $name:ident => $uri:literal;)*) => {
        $(
            $(#[$doc])*
            pub static $name: Lazy<Identifier> = Lazy::new(|| Identifier::from_static($uri));
        )*
    };
}

message_ids! {
    /// Returns its first argument
    ECHO => "ivo://votech.org/test/echo";
    GET_NAME => "ivo://votech.org/info/getName";
    GET_IRN => "ivo://votech.org/info/getIRN";
    GET_VERSION => "ivo://votech.org/info/getVersion";
    GET_DESCRIPTION => "ivo://votech.org/info/getDescription";
    GET_ICON_URL => "ivo://votech.org/info/getIconURL";
    /// Sent by the hub after a peer registers; payload is the new id
    APPLICATION_REGISTERED => "ivo://votech.org/hub/event/ApplicationRegistered";
    /// Sent by the hub after a peer unregisters; payload is the old id
    APPLICATION_UNREGISTERED => "ivo://votech.org/hub/event/ApplicationUnregistered";
    /// Sent by the hub as it shuts down
    HUB_STOPPING => "ivo://votech.org/hub/event/HubStopping";
    /// Asks an application to exit
    HUB_EXIT => "ivo://votech.org/hub/Exit";
    VOTABLE_LOAD => "ivo://votech.org/votable/load";
    VOTABLE_LOAD_FROM_URL => "ivo://votech.org/votable/loadFromURL";
    VOTABLE_SHOW_OBJECTS => "ivo://votech.org/votable/showObjects";
    VOTABLE_HIGHLIGHT_OBJECT => "ivo://votech.org/votable/highlightObject";
    FITS_LOAD_FROM_URL => "ivo://votech.org/fits/image/loadFromURL";
    SPECTRUM_LOAD_FROM_URL => "ivo://votech.org/spectrum/loadFromURL";
    SKY_POINT_AT_COORDS => "ivo://votech.org/sky/pointAtCoords";
}

/// Messages the hub itself emits
pub fn hub_events() -> [Identifier; 3] {
    [
        APPLICATION_REGISTERED.clone(),
        APPLICATION_UNREGISTERED.clone(),
        HUB_STOPPING.clone(),
    ]
}

/// Returns true for the hub's own event messages
pub fn is_hub_event(message: &Identifier) -> bool {
    *message == *APPLICATION_REGISTERED
        || *message == *APPLICATION_UNREGISTERED
        || *message == *HUB_STOPPING
}
