//! PK-005: Resource exporter registry.
//!
//! One static, ordered table maps a resource type to the property that may
//! hold a local artifact and to how the uploaded location is written back.
//! Types missing from the table are simply not packaged.

use super::types::{ExportKind, ExporterDescriptor, WriteBack};
use indexmap::IndexMap;
use std::sync::LazyLock;

const fn url(
    resource_type: &'static str,
    property_path: &'static str,
    package_null_property: bool,
    force_zip: bool,
) -> ExporterDescriptor {
    ExporterDescriptor {
        resource_type,
        property_path,
        package_null_property,
        force_zip,
        write_back: WriteBack::Url,
        kind: ExportKind::Artifact,
    }
}

const fn record(
    resource_type: &'static str,
    property_path: &'static str,
    force_zip: bool,
    keys: (&'static str, &'static str, Option<&'static str>),
) -> ExporterDescriptor {
    ExporterDescriptor {
        resource_type,
        property_path,
        package_null_property: false,
        force_zip,
        write_back: WriteBack::Record {
            bucket_key: keys.0,
            object_key: keys.1,
            version_key: keys.2,
        },
        kind: ExportKind::Artifact,
    }
}

const fn nested(resource_type: &'static str, property_path: &'static str) -> ExporterDescriptor {
    ExporterDescriptor {
        resource_type,
        property_path,
        package_null_property: false,
        force_zip: false,
        write_back: WriteBack::Url,
        kind: ExportKind::NestedTemplate,
    }
}

const LAMBDA_KEYS: (&str, &str, Option<&str>) = ("S3Bucket", "S3Key", Some("S3ObjectVersion"));
const LOCATION_KEYS: (&str, &str, Option<&str>) = ("Bucket", "Key", Some("Version"));

/// The full descriptor table, in registration order.
const EXPORTERS: &[ExporterDescriptor] = &[
    // Serverless (SAM) transforms
    url("AWS::Serverless::Function", "CodeUri", true, true),
    url("AWS::Serverless::Api", "DefinitionUri", false, false),
    url("AWS::Serverless::HttpApi", "DefinitionUri", false, false),
    url("AWS::Serverless::StateMachine", "DefinitionUri", false, false),
    url("AWS::Serverless::GraphQLApi", "SchemaUri", false, false),
    url("AWS::Serverless::LayerVersion", "ContentUri", true, true),
    // AppSync
    url("AWS::AppSync::GraphQLSchema", "DefinitionS3Location", false, false),
    url("AWS::AppSync::Resolver", "CodeS3Location", false, false),
    url("AWS::AppSync::FunctionConfiguration", "CodeS3Location", false, false),
    // Lambda
    record("AWS::Lambda::Function", "Code", true, LAMBDA_KEYS),
    record("AWS::Lambda::LayerVersion", "Content", true, LAMBDA_KEYS),
    // API definitions
    record("AWS::ApiGateway::RestApi", "BodyS3Location", false, LOCATION_KEYS),
    record("AWS::ApiGatewayV2::Api", "BodyS3Location", false, LOCATION_KEYS),
    record("AWS::StepFunctions::StateMachine", "DefinitionS3Location", false, LOCATION_KEYS),
    // Everything else that embeds a bundle
    record(
        "AWS::ElasticBeanstalk::ApplicationVersion",
        "SourceBundle",
        false,
        ("S3Bucket", "S3Key", None),
    ),
    url("AWS::Glue::Job", "Command.ScriptLocation", false, false),
    record(
        "AWS::CodeCommit::Repository",
        "Code.S3",
        true,
        ("Bucket", "Key", Some("ObjectVersion")),
    ),
    // Nested templates
    nested("AWS::CloudFormation::Stack", "TemplateURL"),
    nested("AWS::Serverless::Application", "Location"),
];

static REGISTRY: LazyLock<IndexMap<&'static str, ExporterDescriptor>> = LazyLock::new(|| {
    EXPORTERS
        .iter()
        .map(|d| (d.resource_type, *d))
        .collect()
});

/// Look up the descriptor for a resource type.
pub fn lookup(resource_type: &str) -> Option<&'static ExporterDescriptor> {
    REGISTRY.get(resource_type)
}

/// All registered descriptors, in registration order.
pub fn descriptors() -> impl Iterator<Item = &'static ExporterDescriptor> {
    REGISTRY.values()
}
