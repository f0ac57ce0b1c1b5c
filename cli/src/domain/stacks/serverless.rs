//! Object-created events from a bucket invoke a function that forwards to a
//! queue.

use anyhow::Result;

use crate::domain::config::ServerlessConfig;
use crate::domain::stack::Stack;
use crate::domain::storage::{
    BucketProps, EventPipeline, EventPipelineProps, FunctionCode, FunctionProps,
    NotificationFilter, QueueProps, Removal,
};

pub const NAME: &str = "ServerlessStack";
pub const DESCRIPTION: &str = "Bucket events forwarded to a queue by a function";

/// # Errors
///
/// Returns an error if the configuration is invalid or the resulting graph
/// fails a structural check.
pub fn build(config: &ServerlessConfig, code_hash: &str) -> Result<Stack> {
    let mut stack = Stack::new(NAME, Some(DESCRIPTION))?;
    let props = EventPipelineProps {
        bucket: BucketProps {
            bucket_name: Some(config.bucket_name.clone()),
            removal: Removal::Destroy,
        },
        queue: QueueProps {
            queue_name: Some(config.queue_name.clone()),
            visibility_timeout: None,
        },
        function: FunctionProps::new(
            config.runtime.parse()?,
            &config.handler,
            FunctionCode::Asset {
                path: config.code_path.clone(),
                hash: code_hash.to_string(),
            },
        ),
        filter: NotificationFilter::default(),
    };
    let pipeline = EventPipeline::build(&mut stack, "Pipeline", &props)?;

    stack.add_output("BucketName", &pipeline.bucket.reference(), "Bucket watched for new objects", false)?;
    stack.add_output("QueueUrl", &pipeline.queue.reference(), "Queue receiving forwarded events", false)?;
    Ok(stack)
}
