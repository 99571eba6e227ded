//! ZCL status codes.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! zcl_status {
    ($( $(#[$doc:meta])* $variant:ident = $code:literal => $name:literal, )+) => {
        /// A ZCL status code
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum Status {
            $( $(#[$doc])* $variant, )+
            /// A code this table does not know
            Unknown(u8),
        }

        impl Status {
            /// Decode a status byte
            pub fn from_code(code: u8) -> Self {
                match code {
                    $( $code => Status::$variant, )+
                    other => Status::Unknown(other),
                }
            }

            /// The status byte
            pub fn code(self) -> u8 {
                match self {
                    $( Status::$variant => $code, )+
                    Status::Unknown(code) => code,
                }
            }

            /// Symbolic name, e.g. `UNSUP_CLUSTER_COMMAND`
            pub fn name(self) -> &'static str {
                match self {
                    $( Status::$variant => $name, )+
                    Status::Unknown(_) => "UNKNOWN",
                }
            }
        }
    };
}

zcl_status! {
    /// Operation was successful
    Success = 0x00 => "SUCCESS",
    /// Operation was not successful
    Failure = 0x01 => "FAILURE",
    /// The sender is not authorized
    NotAuthorized = 0x7E => "NOT_AUTHORIZED",
    /// A reserved field was not zero
    ReservedFieldNotZero = 0x7F => "RESERVED_FIELD_NOT_ZERO",
    /// The command appears to contain the wrong fields
    MalformedCommand = 0x80 => "MALFORMED_COMMAND",
    /// The cluster does not support this command
    UnsupClusterCommand = 0x81 => "UNSUP_CLUSTER_COMMAND",
    /// The general command is not supported
    UnsupGeneralCommand = 0x82 => "UNSUP_GENERAL_COMMAND",
    /// Manufacturer-specific cluster command not supported
    UnsupManufClusterCommand = 0x83 => "UNSUP_MANUF_CLUSTER_COMMAND",
    /// Manufacturer-specific general command not supported
    UnsupManufGeneralCommand = 0x84 => "UNSUP_MANUF_GENERAL_COMMAND",
    /// A field contains an invalid value
    InvalidField = 0x85 => "INVALID_FIELD",
    /// The attribute is not supported
    UnsupportedAttribute = 0x86 => "UNSUPPORTED_ATTRIBUTE",
    /// Out of range value
    InvalidValue = 0x87 => "INVALID_VALUE",
    /// Attempt to write a read-only attribute
    ReadOnly = 0x88 => "READ_ONLY",
    /// Not enough space to perform the operation
    InsufficientSpace = 0x89 => "INSUFFICIENT_SPACE",
    /// Duplicate entry
    DuplicateExists = 0x8A => "DUPLICATE_EXISTS",
    /// The requested information was not found
    NotFound = 0x8B => "NOT_FOUND",
    /// Periodic reports cannot be issued for this attribute
    UnreportableAttribute = 0x8C => "UNREPORTABLE_ATTRIBUTE",
    /// The data type given is incorrect
    InvalidDataType = 0x8D => "INVALID_DATA_TYPE",
    /// The selector for an attribute is incorrect
    InvalidSelector = 0x8E => "INVALID_SELECTOR",
    /// Attempt to read a write-only attribute
    WriteOnly = 0x8F => "WRITE_ONLY",
    /// Startup attribute set is inconsistent
    InconsistentStartupState = 0x90 => "INCONSISTENT_STARTUP_STATE",
    /// Attribute already written out of band
    DefinedOutOfBand = 0x91 => "DEFINED_OUT_OF_BAND",
    /// Supplied values are inconsistent
    Inconsistent = 0x92 => "INCONSISTENT",
    /// Credentials do not allow the action
    ActionDenied = 0x93 => "ACTION_DENIED",
    /// The exchange timed out
    Timeout = 0x94 => "TIMEOUT",
    /// Hardware failure on the device
    HardwareFailure = 0xC0 => "HARDWARE_FAILURE",
    /// Software failure on the device
    SoftwareFailure = 0xC1 => "SOFTWARE_FAILURE",
    /// Calibration error
    CalibrationError = 0xC2 => "CALIBRATION_ERROR",
    /// The cluster is not supported on the endpoint
    UnsupportedCluster = 0xC3 => "UNSUPPORTED_CLUSTER",
}

impl Status {
    /// Whether the status means success
    pub fn is_success(self) -> bool {
        self == Status::Success
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Unknown(code) => write!(f, "UNKNOWN(0x{:02X})", code),
            known => f.write_str(known.name()),
        }
    }
}

impl From<u8> for Status {
    fn from(code: u8) -> Self {
        Status::from_code(code)
    }
}
