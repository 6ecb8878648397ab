//! Point-construction and buffered-write pipeline
//!
//! One `Pipeline` serves every action of an instance. It owns nothing
//! host-specific, so it can be built and driven directly in tests.

use std::sync::Arc;

use fluxgate_proto::{parse_fields, parse_tags, LineEncoder, Point, ProtoError, TagSet};
use fluxgate_writer::{Dispatcher, LineSink};

use crate::actions::{Action, ActionOutcome, BooleanOptions, LineOptions, PointOptions};
use crate::error::ActionError;
use crate::variables::VariableResolver;

pub struct Pipeline<S> {
    dispatcher: Arc<Dispatcher<S>>,
    encoder: LineEncoder,
    resolver: Arc<dyn VariableResolver>,
}

impl<S: LineSink> Pipeline<S> {
    pub fn new(
        dispatcher: Arc<Dispatcher<S>>,
        encoder: LineEncoder,
        resolver: Arc<dyn VariableResolver>,
    ) -> Self {
        Self {
            dispatcher,
            encoder,
            resolver,
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher<S>> {
        &self.dispatcher
    }

    /// Run one action
    ///
    /// Construction errors drop only this write; the buffer is untouched.
    pub async fn execute(&self, action: &Action) -> Result<ActionOutcome, ActionError> {
        match action {
            Action::WriteFloatPoint(options) => self.write_float_point(options).await,
            Action::WriteStringPoint(options) => self.write_string_point(options).await,
            Action::WriteBooleanPoint(options) => self.write_boolean_point(options).await,
            Action::WriteLine(options) => self.write_line(options).await,
            Action::FlushBuffer => self.flush().await,
        }
    }

    pub async fn write_float_point(
        &self,
        options: &PointOptions,
    ) -> Result<ActionOutcome, ActionError> {
        let (measurement, tags, field) =
            self.resolve_target(&options.measurement, &options.tags, &options.field)
                .await;
        let value = self.resolver.resolve(&options.value).await;

        let point = Point::float(measurement, tags, field, &value)?;
        Ok(self.dispatch(&point))
    }

    pub async fn write_string_point(
        &self,
        options: &PointOptions,
    ) -> Result<ActionOutcome, ActionError> {
        let (measurement, tags, field) =
            self.resolve_target(&options.measurement, &options.tags, &options.field)
                .await;
        let value = self.resolver.resolve(&options.value).await;

        let point = Point::string(measurement, tags, field, value)?;
        Ok(self.dispatch(&point))
    }

    pub async fn write_boolean_point(
        &self,
        options: &BooleanOptions,
    ) -> Result<ActionOutcome, ActionError> {
        let (measurement, tags, field) =
            self.resolve_target(&options.measurement, &options.tags, &options.field)
                .await;

        let point = Point::boolean(measurement, tags, field, options.value.as_bool())?;
        Ok(self.dispatch(&point))
    }

    /// Raw multi-field line
    ///
    /// `fields` must parse as a field list, but is sent exactly as written.
    pub async fn write_line(&self, options: &LineOptions) -> Result<ActionOutcome, ActionError> {
        let measurement = self.resolver.resolve(&options.measurement).await;
        let tags = self.resolver.resolve(&options.tags).await;
        let fields = self.resolver.resolve(&options.fields).await;

        let measurement = measurement.trim();
        if measurement.is_empty() {
            return Err(ProtoError::EmptyMeasurement.into());
        }
        let fields = fields.trim();
        parse_fields(fields)?;

        let line = self.encoder.raw_line(measurement, tags.trim(), fields);
        self.dispatcher.write_raw(line);
        Ok(ActionOutcome::Buffered)
    }

    pub async fn flush(&self) -> Result<ActionOutcome, ActionError> {
        let flushed = self.dispatcher.flush().await?;
        Ok(ActionOutcome::Flushed(flushed))
    }

    async fn resolve_target(
        &self,
        measurement: &str,
        tags: &str,
        field: &str,
    ) -> (String, TagSet, String) {
        let measurement = self.resolver.resolve(measurement).await;
        let tags = parse_tags(&self.resolver.resolve(tags).await);
        let field = self.resolver.resolve(field).await;
        (measurement, tags, field)
    }

    fn dispatch(&self, point: &Point) -> ActionOutcome {
        self.dispatcher.enqueue(self.encoder.encode(point));
        ActionOutcome::Buffered
    }
}
