//! IDMEF class schema.
//!
//! The message model is a fixed tree: every class owns a static list of
//! children, each either a nested object or a typed leaf value. Object paths
//! are resolved against this table.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Type of a leaf value in the message tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
    String,
    /// Enumerated keyword stored as text.
    Enum,
    /// Timestamp with GMT offset and microseconds.
    Time,
    /// Opaque binary payload.
    Data,
}

impl ValueType {
    /// Check if this type is an integer type.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ValueType::Int8
                | ValueType::UInt8
                | ValueType::Int16
                | ValueType::UInt16
                | ValueType::Int32
                | ValueType::UInt32
                | ValueType::Int64
                | ValueType::UInt64
        )
    }

    /// Check if this type is numeric (integer or floating point).
    pub fn is_numeric(&self) -> bool {
        self.is_integer() || matches!(self, ValueType::Float | ValueType::Double)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Int8 => "int8",
            ValueType::UInt8 => "uint8",
            ValueType::Int16 => "int16",
            ValueType::UInt16 => "uint16",
            ValueType::Int32 => "int32",
            ValueType::UInt32 => "uint32",
            ValueType::Int64 => "int64",
            ValueType::UInt64 => "uint64",
            ValueType::Float => "float",
            ValueType::Double => "double",
            ValueType::String => "string",
            ValueType::Enum => "enum",
            ValueType::Time => "time",
            ValueType::Data => "data",
        };
        f.write_str(name)
    }
}

/// An IDMEF class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdmefClass {
    Alert,
    Heartbeat,
    Analyzer,
    Classification,
    Reference,
    Source,
    Target,
    Node,
    Address,
    User,
    UserId,
    Process,
    Service,
    WebService,
    SnmpService,
    File,
    FileAccess,
    Linkage,
    Inode,
    Checksum,
    Assessment,
    Impact,
    Action,
    Confidence,
    ToolAlert,
    CorrelationAlert,
    Alertident,
    OverflowAlert,
    AdditionalData,
}

/// What a child element holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildKind {
    /// A nested object of the given class.
    Object(IdmefClass),
    /// A leaf value of the given type.
    Value(ValueType),
}

/// A named child of a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Child {
    pub name: &'static str,
    pub kind: ChildKind,
    /// Whether the element is a list and accepts an index.
    pub listed: bool,
}

const fn object(name: &'static str, class: IdmefClass) -> Child {
    Child {
        name,
        kind: ChildKind::Object(class),
        listed: false,
    }
}

const fn object_list(name: &'static str, class: IdmefClass) -> Child {
    Child {
        name,
        kind: ChildKind::Object(class),
        listed: true,
    }
}

const fn value(name: &'static str, value_type: ValueType) -> Child {
    Child {
        name,
        kind: ChildKind::Value(value_type),
        listed: false,
    }
}

const fn value_list(name: &'static str, value_type: ValueType) -> Child {
    Child {
        name,
        kind: ChildKind::Value(value_type),
        listed: true,
    }
}

use IdmefClass as C;
use ValueType as V;

const ALERT: &[Child] = &[
    value("messageid", V::String),
    object_list("analyzer", C::Analyzer),
    value("create_time", V::Time),
    object("classification", C::Classification),
    value("detect_time", V::Time),
    value("analyzer_time", V::Time),
    object_list("source", C::Source),
    object_list("target", C::Target),
    object("assessment", C::Assessment),
    object_list("additional_data", C::AdditionalData),
    object("tool_alert", C::ToolAlert),
    object("correlation_alert", C::CorrelationAlert),
    object("overflow_alert", C::OverflowAlert),
];

const HEARTBEAT: &[Child] = &[
    value("messageid", V::String),
    object_list("analyzer", C::Analyzer),
    value("create_time", V::Time),
    value("analyzer_time", V::Time),
    value("heartbeat_interval", V::UInt32),
    object_list("additional_data", C::AdditionalData),
];

const ANALYZER: &[Child] = &[
    value("analyzerid", V::String),
    value("name", V::String),
    value("manufacturer", V::String),
    value("model", V::String),
    value("version", V::String),
    value("class", V::String),
    value("ostype", V::String),
    value("osversion", V::String),
    object("node", C::Node),
    object("process", C::Process),
];

const CLASSIFICATION: &[Child] = &[
    value("ident", V::String),
    value("text", V::String),
    object_list("reference", C::Reference),
];

const REFERENCE: &[Child] = &[
    value("origin", V::Enum),
    value("name", V::String),
    value("url", V::String),
    value("meaning", V::String),
];

const SOURCE: &[Child] = &[
    value("ident", V::String),
    value("spoofed", V::Enum),
    value("interface", V::String),
    object("node", C::Node),
    object("user", C::User),
    object("process", C::Process),
    object("service", C::Service),
];

const TARGET: &[Child] = &[
    value("ident", V::String),
    value("decoy", V::Enum),
    value("interface", V::String),
    object("node", C::Node),
    object("user", C::User),
    object("process", C::Process),
    object("service", C::Service),
    object_list("file", C::File),
];

const NODE: &[Child] = &[
    value("ident", V::String),
    value("category", V::Enum),
    value("location", V::String),
    value("name", V::String),
    object_list("address", C::Address),
];

const ADDRESS: &[Child] = &[
    value("ident", V::String),
    value("category", V::Enum),
    value("vlan_name", V::String),
    value("vlan_num", V::Int32),
    value("address", V::String),
    value("netmask", V::String),
];

const USER: &[Child] = &[
    value("ident", V::String),
    value("category", V::Enum),
    object_list("user_id", C::UserId),
];

const USER_ID: &[Child] = &[
    value("ident", V::String),
    value("type", V::Enum),
    value("tty", V::String),
    value("name", V::String),
    value("number", V::UInt32),
];

const PROCESS: &[Child] = &[
    value("ident", V::String),
    value("name", V::String),
    value("pid", V::UInt32),
    value("path", V::String),
    value_list("arg", V::String),
    value_list("env", V::String),
];

const SERVICE: &[Child] = &[
    value("ident", V::String),
    value("ip_version", V::UInt8),
    value("iana_protocol_number", V::UInt8),
    value("iana_protocol_name", V::String),
    value("name", V::String),
    value("port", V::UInt16),
    value("portlist", V::String),
    value("protocol", V::String),
    object("web_service", C::WebService),
    object("snmp_service", C::SnmpService),
];

const WEB_SERVICE: &[Child] = &[
    value("url", V::String),
    value("cgi", V::String),
    value("http_method", V::String),
    value_list("arg", V::String),
];

const SNMP_SERVICE: &[Child] = &[
    value("oid", V::String),
    value("message_processing_model", V::UInt32),
    value("security_model", V::UInt32),
    value("security_name", V::String),
    value("security_level", V::UInt32),
    value("context_name", V::String),
    value("context_engine_id", V::String),
    value("command", V::String),
];

const FILE: &[Child] = &[
    value("ident", V::String),
    value("name", V::String),
    value("path", V::String),
    value("create_time", V::Time),
    value("modify_time", V::Time),
    value("access_time", V::Time),
    value("data_size", V::UInt64),
    value("disk_size", V::UInt64),
    object_list("file_access", C::FileAccess),
    object_list("linkage", C::Linkage),
    object("inode", C::Inode),
    object_list("checksum", C::Checksum),
    value("category", V::Enum),
    value("fstype", V::Enum),
    value("file_type", V::String),
];

const FILE_ACCESS: &[Child] = &[
    object("user_id", C::UserId),
    value_list("permission", V::String),
];

const LINKAGE: &[Child] = &[
    value("category", V::Enum),
    value("name", V::String),
    value("path", V::String),
    object("file", C::File),
];

const INODE: &[Child] = &[
    value("change_time", V::Time),
    value("number", V::UInt32),
    value("major_device", V::UInt32),
    value("minor_device", V::UInt32),
    value("c_major_device", V::UInt32),
    value("c_minor_device", V::UInt32),
];

const CHECKSUM: &[Child] = &[
    value("value", V::String),
    value("key", V::String),
    value("algorithm", V::Enum),
];

const ASSESSMENT: &[Child] = &[
    object("impact", C::Impact),
    object_list("action", C::Action),
    object("confidence", C::Confidence),
];

const IMPACT: &[Child] = &[
    value("severity", V::Enum),
    value("completion", V::Enum),
    value("type", V::Enum),
    value("description", V::String),
];

const ACTION: &[Child] = &[value("category", V::Enum), value("description", V::String)];

const CONFIDENCE: &[Child] = &[value("rating", V::Enum), value("confidence", V::Float)];

const TOOL_ALERT: &[Child] = &[
    value("name", V::String),
    value("command", V::String),
    object_list("alertident", C::Alertident),
];

const CORRELATION_ALERT: &[Child] = &[
    value("name", V::String),
    object_list("alertident", C::Alertident),
];

const ALERTIDENT: &[Child] = &[value("alertident", V::String), value("analyzerid", V::String)];

const OVERFLOW_ALERT: &[Child] = &[
    value("program", V::String),
    value("size", V::UInt32),
    value("buffer", V::Data),
];

const ADDITIONAL_DATA: &[Child] = &[
    value("meaning", V::String),
    value("type", V::Enum),
    value("data", V::Data),
];

impl IdmefClass {
    /// The class name as used in object paths (`snake_case`).
    pub fn name(&self) -> &'static str {
        match self {
            C::Alert => "alert",
            C::Heartbeat => "heartbeat",
            C::Analyzer => "analyzer",
            C::Classification => "classification",
            C::Reference => "reference",
            C::Source => "source",
            C::Target => "target",
            C::Node => "node",
            C::Address => "address",
            C::User => "user",
            C::UserId => "user_id",
            C::Process => "process",
            C::Service => "service",
            C::WebService => "web_service",
            C::SnmpService => "snmp_service",
            C::File => "file",
            C::FileAccess => "file_access",
            C::Linkage => "linkage",
            C::Inode => "inode",
            C::Checksum => "checksum",
            C::Assessment => "assessment",
            C::Impact => "impact",
            C::Action => "action",
            C::Confidence => "confidence",
            C::ToolAlert => "tool_alert",
            C::CorrelationAlert => "correlation_alert",
            C::Alertident => "alertident",
            C::OverflowAlert => "overflow_alert",
            C::AdditionalData => "additional_data",
        }
    }

    /// Children of this class, in declaration order.
    pub fn children(&self) -> &'static [Child] {
        match self {
            C::Alert => ALERT,
            C::Heartbeat => HEARTBEAT,
            C::Analyzer => ANALYZER,
            C::Classification => CLASSIFICATION,
            C::Reference => REFERENCE,
            C::Source => SOURCE,
            C::Target => TARGET,
            C::Node => NODE,
            C::Address => ADDRESS,
            C::User => USER,
            C::UserId => USER_ID,
            C::Process => PROCESS,
            C::Service => SERVICE,
            C::WebService => WEB_SERVICE,
            C::SnmpService => SNMP_SERVICE,
            C::File => FILE,
            C::FileAccess => FILE_ACCESS,
            C::Linkage => LINKAGE,
            C::Inode => INODE,
            C::Checksum => CHECKSUM,
            C::Assessment => ASSESSMENT,
            C::Impact => IMPACT,
            C::Action => ACTION,
            C::Confidence => CONFIDENCE,
            C::ToolAlert => TOOL_ALERT,
            C::CorrelationAlert => CORRELATION_ALERT,
            C::Alertident => ALERTIDENT,
            C::OverflowAlert => OVERFLOW_ALERT,
            C::AdditionalData => ADDITIONAL_DATA,
        }
    }

    /// Look up a child by name.
    pub fn child(&self, name: &str) -> Option<&'static Child> {
        self.children().iter().find(|c| c.name == name)
    }

    /// Resolve a top-level message class from its path name.
    pub fn from_root_name(name: &str) -> Option<IdmefClass> {
        match name {
            "alert" => Some(C::Alert),
            "heartbeat" => Some(C::Heartbeat),
            _ => None,
        }
    }

    /// Check if this class is a top-level message class.
    pub fn is_message(&self) -> bool {
        matches!(self, C::Alert | C::Heartbeat)
    }
}

impl fmt::Display for IdmefClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
