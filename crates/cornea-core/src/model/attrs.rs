//! Well-known attribute names, grouped by namespace.

pub mod base {
    pub const ADDRESS: &str = "base:address";
    pub const TYPE: &str = "base:type";
    pub const CAPS: &str = "base:caps";
    pub const TAGS: &str = "base:tags";
}

pub mod dev {
    pub const NAME: &str = "dev:name";
    pub const VENDOR: &str = "dev:vendor";
    pub const MODEL: &str = "dev:model";
    pub const TYPE_HINT: &str = "dev:devtypehint";
}

pub mod devconn {
    pub const STATE: &str = "devconn:state";
    pub const ONLINE: &str = "ONLINE";
}

pub mod subs {
    pub const NAME: &str = "subs:name";
    pub const AVAILABLE: &str = "subs:available";
    pub const STATE: &str = "subs:state";
    pub const PLACE_ID: &str = "subs:placeId";
    /// Key of the entity array in a `subs:ListSubsystems` response.
    pub const LIST_KEY: &str = "subsystems";
}

pub mod place {
    pub const NAME: &str = "place:name";
    pub const STREET: &str = "place:streetAddress1";
    pub const CITY: &str = "place:city";
    pub const TIMEZONE: &str = "place:tzName";
}

pub mod person {
    pub const FIRST_NAME: &str = "person:firstName";
    pub const LAST_NAME: &str = "person:lastName";
    pub const EMAIL: &str = "person:email";
}

pub mod scene {
    pub const NAME: &str = "scene:name";
    pub const ENABLED: &str = "scene:enabled";
    pub const TEMPLATE: &str = "scene:template";
}

pub mod subsecurity {
    pub const ALARM_STATE: &str = "subsecurity:alarmState";
    pub const ALARM_MODE: &str = "subsecurity:alarmMode";
    pub const SECURITY_DEVICES: &str = "subsecurity:securityDevices";
    pub const TRIGGERED_DEVICES: &str = "subsecurity:triggeredDevices";
    pub const OFFLINE_DEVICES: &str = "subsecurity:offlineDevices";
    pub const BYPASSED_DEVICES: &str = "subsecurity:bypassedDevices";

    pub const ARM: &str = "subsecurity:Arm";
    pub const ARM_BYPASSED: &str = "subsecurity:ArmBypassed";
    pub const DISARM: &str = "subsecurity:Disarm";
    pub const MODE_ARG: &str = "mode";

    /// Error code that asks the user to bypass triggered devices.
    pub const ERR_TRIGGERED_DEVICES: &str = "security.triggeredDevices";
}

pub mod subspres {
    pub const PEOPLE_AT_HOME: &str = "subspres:peopleAtHome";
    pub const PEOPLE_AWAY: &str = "subspres:peopleAway";
    pub const DEVICES_AT_HOME: &str = "subspres:devicesAtHome";
    pub const DEVICES_AWAY: &str = "subspres:devicesAway";
}
