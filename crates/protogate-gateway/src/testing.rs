//! Descriptor and RPC fixtures for unit tests

use crate::descriptor::leading_comments;
use crate::discovery::LoadedGroup;
use bytes::Bytes;
use heck::ToLowerCamelCase;
use prost::Message;
use prost_reflect::{DescriptorPool, DynamicMessage, Value};
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::source_code_info::Location;
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto, FileDescriptorSet, MessageOptions, MethodDescriptorProto,
    ServiceDescriptorProto, SourceCodeInfo,
};
use protogate_client::{BoxFuture, Connector, Endpoint, RpcChannel, RpcError};
use std::sync::{Arc, Mutex};

pub(crate) const ORDER_SERVICE_DOC: &str = "Order service.\n[REST] host=localhost port=50051\n";
pub(crate) const GET_ORDER_DOC: &str = "Fetch one order.\n[REST] request=GetOrderRequest response=OrderResponse method=get path=/{id}/\n[REST] id:int\n";
pub(crate) const LIST_ORDERS_DOC: &str = "[REST] request=ListOrdersRequest response=ListOrdersResponse method=post path=/search\n[REST] customer:str page:int\n";

pub(crate) fn field(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(ty as i32),
        json_name: Some(name.to_lower_camel_case()),
        ..Default::default()
    }
}

pub(crate) fn typed(name: &str, number: i32, ty: Type, type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        type_name: Some(type_name.to_string()),
        ..field(name, number, ty)
    }
}

pub(crate) fn repeated(mut field: FieldDescriptorProto) -> FieldDescriptorProto {
    field.label = Some(Label::Repeated as i32);
    field
}

pub(crate) fn message(name: &str, fields: Vec<FieldDescriptorProto>) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_string()),
        field: fields,
        ..Default::default()
    }
}

pub(crate) fn rpc(name: &str, input: &str, output: &str) -> MethodDescriptorProto {
    MethodDescriptorProto {
        name: Some(name.to_string()),
        input_type: Some(format!(".{}", input)),
        output_type: Some(format!(".{}", output)),
        ..Default::default()
    }
}

/// Leading comment locations for a service and its methods. Empty docs get
/// no location.
pub(crate) fn service_comments(service: i32, service_doc: &str, method_docs: &[&str]) -> SourceCodeInfo {
    let mut location = Vec::new();
    let mut push = |path: Vec<i32>, doc: &str| {
        if !doc.is_empty() {
            location.push(Location {
                path,
                span: vec![0, 0, 0],
                leading_comments: Some(doc.to_string()),
                ..Default::default()
            });
        }
    };

    push(vec![6, service], service_doc);
    for (i, doc) in method_docs.iter().enumerate() {
        push(vec![6, service, 2, i as i32], doc);
    }

    SourceCodeInfo { location }
}

pub(crate) fn timestamp_file() -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some("google/protobuf/timestamp.proto".to_string()),
        package: Some("google.protobuf".to_string()),
        message_type: vec![message(
            "Timestamp",
            vec![field("seconds", 1, Type::Int64), field("nanos", 2, Type::Int32)],
        )],
        syntax: Some("proto3".to_string()),
        ..Default::default()
    }
}

/// `shop/v1/order.proto` with the `Order` service: `GetOrder`, `ListOrders`
/// and `Ping`, in that order
pub(crate) fn order_file_with_docs(service_doc: &str, method_docs: &[&str]) -> FileDescriptorProto {
    let labels_entry = DescriptorProto {
        options: Some(MessageOptions {
            map_entry: Some(true),
            ..Default::default()
        }),
        ..message(
            "LabelsEntry",
            vec![field("key", 1, Type::String), field("value", 2, Type::String)],
        )
    };

    let mut order_response = message(
        "OrderResponse",
        vec![
            field("id", 1, Type::Int64),
            field("status", 2, Type::String),
            repeated(typed("items", 3, Type::Message, ".shop.v1.OrderItem")),
            repeated(typed(
                "labels",
                4,
                Type::Message,
                ".shop.v1.OrderResponse.LabelsEntry",
            )),
            typed("state", 5, Type::Enum, ".shop.v1.OrderState"),
            field("total", 6, Type::Double),
            typed("created_at", 7, Type::Message, ".google.protobuf.Timestamp"),
        ],
    );
    order_response.nested_type.push(labels_entry);

    FileDescriptorProto {
        name: Some("shop/v1/order.proto".to_string()),
        package: Some("shop.v1".to_string()),
        dependency: vec!["google/protobuf/timestamp.proto".to_string()],
        message_type: vec![
            message("GetOrderRequest", vec![field("id", 1, Type::Int64)]),
            message(
                "OrderItem",
                vec![field("sku", 1, Type::String), field("quantity", 2, Type::Int32)],
            ),
            order_response,
            message(
                "ListOrdersRequest",
                vec![
                    field("customer", 1, Type::String),
                    field("page", 2, Type::Int32),
                    field("status", 3, Type::String),
                ],
            ),
            message(
                "ListOrdersResponse",
                vec![repeated(typed("orders", 1, Type::Message, ".shop.v1.OrderResponse"))],
            ),
            message("Empty", vec![]),
        ],
        enum_type: vec![EnumDescriptorProto {
            name: Some("OrderState".to_string()),
            value: vec![
                EnumValueDescriptorProto {
                    name: Some("PENDING".to_string()),
                    number: Some(0),
                    ..Default::default()
                },
                EnumValueDescriptorProto {
                    name: Some("SHIPPED".to_string()),
                    number: Some(1),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }],
        service: vec![ServiceDescriptorProto {
            name: Some("Order".to_string()),
            method: vec![
                rpc("GetOrder", "shop.v1.GetOrderRequest", "shop.v1.OrderResponse"),
                rpc("ListOrders", "shop.v1.ListOrdersRequest", "shop.v1.ListOrdersResponse"),
                rpc("Ping", "shop.v1.Empty", "shop.v1.Empty"),
            ],
            ..Default::default()
        }],
        source_code_info: Some(service_comments(0, service_doc, method_docs)),
        syntax: Some("proto3".to_string()),
        ..Default::default()
    }
}

pub(crate) fn order_file() -> FileDescriptorProto {
    order_file_with_docs(ORDER_SERVICE_DOC, &[GET_ORDER_DOC, LIST_ORDERS_DOC, ""])
}

pub(crate) fn pool_of(files: Vec<FileDescriptorProto>) -> DescriptorPool {
    DescriptorPool::from_file_descriptor_set(FileDescriptorSet { file: files }).unwrap()
}

pub(crate) fn order_pool() -> DescriptorPool {
    pool_of(vec![timestamp_file(), order_file()])
}

pub(crate) fn group_with_docs(service_doc: &str, method_docs: &[&str]) -> LoadedGroup {
    let files = vec![timestamp_file(), order_file_with_docs(service_doc, method_docs)];
    let comments = leading_comments(&files);
    LoadedGroup::from_pool("order", pool_of(files), &comments)
}

pub(crate) fn order_group() -> LoadedGroup {
    group_with_docs(ORDER_SERVICE_DOC, &[GET_ORDER_DOC, LIST_ORDERS_DOC, ""])
}

/// Encoded `OrderResponse { id, status: "shipped" }`
pub(crate) fn order_reply(id: i64) -> Bytes {
    let descriptor = order_pool()
        .get_message_by_name("shop.v1.OrderResponse")
        .unwrap();
    let mut reply = DynamicMessage::new(descriptor);
    reply.set_field_by_name("id", Value::I64(id));
    reply.set_field_by_name("status", Value::String("shipped".to_string()));
    Bytes::from(reply.encode_to_vec())
}

/// `billing.v1.Invoice` and `archive.v1.Invoice`, billing first
pub(crate) fn two_package_pool() -> DescriptorPool {
    let file = |package: &str| FileDescriptorProto {
        name: Some(format!("{}/invoice.proto", package.replace('.', "/"))),
        package: Some(package.to_string()),
        message_type: vec![message("Invoice", vec![field("number", 1, Type::String)])],
        syntax: Some("proto3".to_string()),
        ..Default::default()
    };
    pool_of(vec![file("billing.v1"), file("archive.v1")])
}

type Reply = Arc<dyn Fn(&str, &Bytes) -> Result<Bytes, RpcError> + Send + Sync>;

/// Records every call and answers with `reply`
#[derive(Clone)]
pub(crate) struct MockChannel {
    pub calls: Arc<Mutex<Vec<(String, String, Bytes)>>>,
    reply: Reply,
}

impl MockChannel {
    pub fn new(
        reply: impl Fn(&str, &Bytes) -> Result<Bytes, RpcError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            reply: Arc::new(reply),
        }
    }
}

impl RpcChannel for MockChannel {
    fn unary(
        &self,
        service: &str,
        method: &str,
        request: Bytes,
    ) -> BoxFuture<'static, Result<Bytes, RpcError>> {
        let result = (self.reply)(method, &request);
        self.calls
            .lock()
            .unwrap()
            .push((service.to_string(), method.to_string(), request));
        Box::pin(async move { result })
    }
}

/// Hands out one shared [`MockChannel`] and records endpoints
pub(crate) struct MockConnector {
    pub channel: MockChannel,
    pub endpoints: Mutex<Vec<Endpoint>>,
}

impl MockConnector {
    pub fn new(channel: MockChannel) -> Self {
        Self {
            channel,
            endpoints: Mutex::new(Vec::new()),
        }
    }
}

impl Connector for MockConnector {
    fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn RpcChannel>, RpcError> {
        self.endpoints.lock().unwrap().push(endpoint.clone());
        Ok(Arc::new(self.channel.clone()))
    }
}
