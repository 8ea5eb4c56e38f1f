//! Shared fixtures: descriptor trees on disk and an in-memory RPC channel

#![allow(dead_code)]

use bytes::Bytes;
use prost::Message;
use prost_reflect::{DescriptorPool, DynamicMessage};
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::source_code_info::Location;
use prost_types::{
    DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet,
    MethodDescriptorProto, ServiceDescriptorProto, SourceCodeInfo,
};
use protogate_client::{BoxFuture, Connector, Endpoint, RpcChannel, RpcError};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const SERVICE_DOC: &str = " Orders.\n [REST] host=orders.internal port=50051\n";
pub const GET_ORDER_DOC: &str = " Fetch one order.\n [REST] request=GetOrderRequest response=OrderResponse method=get path=/{id}/\n [REST] id:int\n";
pub const CREATE_ORDER_DOC: &str = " [REST] request=CreateOrderRequest response=OrderResponse\n";

fn field(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(ty as i32),
        ..Default::default()
    }
}

fn message(name: &str, fields: Vec<FieldDescriptorProto>) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_string()),
        field: fields,
        ..Default::default()
    }
}

/// `shop/v1/messages.proto`
pub fn messages_file() -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some("shop/v1/messages.proto".to_string()),
        package: Some("shop.v1".to_string()),
        message_type: vec![
            message("GetOrderRequest", vec![field("id", 1, Type::Int64)]),
            message(
                "CreateOrderRequest",
                vec![
                    field("customer", 1, Type::String),
                    field("quantity", 2, Type::Int32),
                ],
            ),
            message(
                "OrderResponse",
                vec![field("id", 1, Type::Int64), field("status", 2, Type::String)],
            ),
        ],
        syntax: Some("proto3".to_string()),
        ..Default::default()
    }
}

/// `shop/v1/<stem>.proto` declaring service `name` with `GetOrder` then
/// `CreateOrder`; comments are raw protoc leading comments
pub fn service_file(stem: &str, name: &str, service_doc: &str, method_docs: [&str; 2]) -> FileDescriptorProto {
    let rpc = |method: &str, input: &str| MethodDescriptorProto {
        name: Some(method.to_string()),
        input_type: Some(format!(".shop.v1.{}", input)),
        output_type: Some(".shop.v1.OrderResponse".to_string()),
        ..Default::default()
    };

    let mut location = vec![Location {
        path: vec![6, 0],
        span: vec![0, 0, 0],
        leading_comments: Some(service_doc.to_string()),
        ..Default::default()
    }];
    for (i, doc) in method_docs.iter().enumerate() {
        location.push(Location {
            path: vec![6, 0, 2, i as i32],
            span: vec![0, 0, 0],
            leading_comments: Some(doc.to_string()),
            ..Default::default()
        });
    }

    FileDescriptorProto {
        name: Some(format!("shop/v1/{}.proto", stem)),
        package: Some("shop.v1".to_string()),
        dependency: vec!["shop/v1/messages.proto".to_string()],
        service: vec![ServiceDescriptorProto {
            name: Some(name.to_string()),
            method: vec![
                rpc("GetOrder", "GetOrderRequest"),
                rpc("CreateOrder", "CreateOrderRequest"),
            ],
            ..Default::default()
        }],
        source_code_info: Some(SourceCodeInfo { location }),
        syntax: Some("proto3".to_string()),
        ..Default::default()
    }
}

/// Descriptor tree in a temporary directory
pub struct DescriptorTree {
    dir: TempDir,
}

impl DescriptorTree {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Write `<group>/<stem>_pb_grpc.binpb` with the service file and
    /// `<group>/<stem>_pb.binpb` with the messages it imports
    pub fn add_service(&self, group: &str, stem: &str, service: FileDescriptorProto) -> PathBuf {
        let dir = self.dir.path().join(group);
        fs::create_dir_all(&dir).unwrap();
        write_set(&dir.join(format!("{}_pb.binpb", stem)), vec![messages_file()]);
        write_set(
            &dir.join(format!("{}_pb_grpc.binpb", stem)),
            vec![messages_file(), service],
        );
        dir
    }

    pub fn add_file(&self, relative: &str, contents: &[u8]) {
        let path = self.dir.path().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }
}

pub fn write_set(path: &Path, files: Vec<FileDescriptorProto>) {
    fs::write(path, FileDescriptorSet { file: files }.encode_to_vec()).unwrap();
}

pub fn message_pool() -> DescriptorPool {
    DescriptorPool::from_file_descriptor_set(FileDescriptorSet {
        file: vec![messages_file()],
    })
    .unwrap()
}

/// Encode a message of `shop.v1.<name>` from JSON
pub fn encode(name: &str, json: serde_json::Value) -> Bytes {
    let descriptor = message_pool()
        .get_message_by_name(&format!("shop.v1.{}", name))
        .unwrap();
    let message = DynamicMessage::deserialize(descriptor, json).unwrap();
    Bytes::from(message.encode_to_vec())
}

pub fn decode(name: &str, bytes: Bytes) -> DynamicMessage {
    let descriptor = message_pool()
        .get_message_by_name(&format!("shop.v1.{}", name))
        .unwrap();
    DynamicMessage::decode(descriptor, bytes).unwrap()
}

type Reply = Arc<dyn Fn(&str) -> Result<Bytes, RpcError> + Send + Sync>;

/// In-memory channel answering every call with `reply(method)`
#[derive(Clone)]
pub struct MockChannel {
    pub calls: Arc<Mutex<Vec<(String, String, Bytes)>>>,
    reply: Reply,
}

impl RpcChannel for MockChannel {
    fn unary(&self, service: &str, method: &str, request: Bytes) -> BoxFuture<'static, Result<Bytes, RpcError>> {
        let result = (self.reply)(method);
        self.calls
            .lock()
            .unwrap()
            .push((service.to_string(), method.to_string(), request));
        Box::pin(async move { result })
    }
}

pub struct MockConnector {
    pub channel: MockChannel,
    pub endpoints: Mutex<Vec<Endpoint>>,
}

impl MockConnector {
    pub fn new(reply: impl Fn(&str) -> Result<Bytes, RpcError> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            channel: MockChannel {
                calls: Arc::new(Mutex::new(Vec::new())),
                reply: Arc::new(reply),
            },
            endpoints: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<(String, String, Bytes)> {
        self.channel.calls.lock().unwrap().clone()
    }
}

impl Connector for MockConnector {
    fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn RpcChannel>, RpcError> {
        self.endpoints.lock().unwrap().push(endpoint.clone());
        Ok(Arc::new(self.channel.clone()))
    }
}
