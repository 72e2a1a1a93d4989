// Messages of the `qlik.sse` protocol (ServerSideExtension.proto). Field
// numbers and names must stay in lockstep with the published contract.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum DataType {
    String = 0,
    Numeric = 1,
    Dual = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum FunctionType {
    Scalar = 0,
    Aggregation = 1,
    Tensor = 2,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Empty {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Parameter {
    #[prost(enumeration = "DataType", tag = "1")]
    pub data_type: i32,
    #[prost(string, tag = "2")]
    pub name: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FieldDescription {
    #[prost(enumeration = "DataType", tag = "1")]
    pub data_type: i32,
    #[prost(string, tag = "2")]
    pub name: ::prost::alloc::string::String,
    #[prost(string, repeated, tag = "3")]
    pub tags: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FunctionDefinition {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(enumeration = "FunctionType", tag = "2")]
    pub function_type: i32,
    #[prost(enumeration = "DataType", tag = "3")]
    pub return_type: i32,
    #[prost(message, repeated, tag = "4")]
    pub params: ::prost::alloc::vec::Vec<Parameter>,
    #[prost(int32, tag = "5")]
    pub function_id: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Capabilities {
    #[prost(bool, tag = "1")]
    pub allow_script: bool,
    #[prost(message, repeated, tag = "2")]
    pub functions: ::prost::alloc::vec::Vec<FunctionDefinition>,
    #[prost(string, tag = "3")]
    pub plugin_identifier: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub plugin_version: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Dual {
    #[prost(double, tag = "1")]
    pub num_data: f64,
    #[prost(string, tag = "2")]
    pub str_data: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Row {
    #[prost(message, repeated, tag = "1")]
    pub duals: ::prost::alloc::vec::Vec<Dual>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BundledRows {
    #[prost(message, repeated, tag = "1")]
    pub rows: ::prost::alloc::vec::Vec<Row>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ScriptRequestHeader {
    #[prost(string, tag = "1")]
    pub script: ::prost::alloc::string::String,
    #[prost(enumeration = "FunctionType", tag = "2")]
    pub function_type: i32,
    #[prost(enumeration = "DataType", tag = "3")]
    pub return_type: i32,
    #[prost(message, repeated, tag = "4")]
    pub params: ::prost::alloc::vec::Vec<Parameter>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FunctionRequestHeader {
    #[prost(int32, tag = "1")]
    pub function_id: i32,
    #[prost(string, tag = "2")]
    pub version: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CommonRequestHeader {
    #[prost(string, tag = "1")]
    pub app_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub user_id: ::prost::alloc::string::String,
    #[prost(int64, tag = "3")]
    pub cardinality: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TableDescription {
    #[prost(message, repeated, tag = "1")]
    pub fields: ::prost::alloc::vec::Vec<FieldDescription>,
    #[prost(string, tag = "2")]
    pub name: ::prost::alloc::string::String,
    #[prost(int64, tag = "3")]
    pub number_of_rows: i64,
}
