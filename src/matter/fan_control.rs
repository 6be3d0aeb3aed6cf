//! Fan Control cluster handler for rs-matter integration.
//!
//! Bridges [`FanControlClusterLogic`] to rs-matter's Handler trait. The logic
//! stays the single source of truth; this handler only decodes TLV, maps
//! statuses and bumps the dataver whenever the logic's change counter moved.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use log::{debug, warn};
use parking_lot::RwLock;

use rs_matter::dm::{
    Access, Attribute, Cluster, Command, Dataver, Handler, InvokeContext, InvokeReply,
    NonBlockingHandler, Quality, ReadContext, ReadReply, Reply, WriteContext,
};
use rs_matter::error::{Error, ErrorCode};
use rs_matter::{attribute_enum, attributes, command_enum, commands};

use crate::clusters::fan_control::{
    AttributeId, AttributeValue, CLUSTER_ID, CLUSTER_REVISION, ClusterStatus, CommandId,
    FanControlCapabilities, FanControlClusterLogic, FanModeSequenceEnum, Feature, StepRequest,
    is_attribute_supported,
};

attribute_enum!(AttributeId);
command_enum!(CommandId);

/// Attributes present for the feature map the node was built with.
fn with_fan_attrs(attr: &Attribute, _revision: u16, feature_map: u32) -> bool {
    if attr.is_system() {
        return true;
    }
    let caps = FanControlCapabilities::new(
        Feature::from_bits_truncate(feature_map),
        FanModeSequenceEnum::default(),
    );
    AttributeId::from_repr(attr.id).is_some_and(|id| is_attribute_supported(&caps, id))
}

fn with_fan_cmds(cmd: &Command, _revision: u16, feature_map: u32) -> bool {
    match CommandId::from_repr(cmd.id) {
        Some(CommandId::Step) => Feature::from_bits_truncate(feature_map).contains(Feature::STEP),
        None => false,
    }
}

/// Full Fan Control cluster definition, features unset.
///
/// Use [`cluster`] to get the definition for a concrete device.
pub const CLUSTER: Cluster<'static> = Cluster {
    id: CLUSTER_ID,
    revision: CLUSTER_REVISION,
    feature_map: 0,
    attributes: attributes!(
        Attribute::new(AttributeId::FanMode as _, Access::RWVM, Quality::NONE),
        Attribute::new(AttributeId::FanModeSequence as _, Access::RV, Quality::FIXED),
        Attribute::new(AttributeId::PercentSetting as _, Access::RWVM, Quality::X),
        Attribute::new(AttributeId::PercentCurrent as _, Access::RV, Quality::NONE),
        Attribute::new(AttributeId::SpeedMax as _, Access::RV, Quality::FIXED),
        Attribute::new(AttributeId::SpeedSetting as _, Access::RWVM, Quality::X),
        Attribute::new(AttributeId::SpeedCurrent as _, Access::RV, Quality::NONE),
        Attribute::new(AttributeId::RockSupport as _, Access::RV, Quality::FIXED),
        Attribute::new(AttributeId::RockSetting as _, Access::RWVM, Quality::NONE),
        Attribute::new(AttributeId::WindSupport as _, Access::RV, Quality::FIXED),
        Attribute::new(AttributeId::WindSetting as _, Access::RWVM, Quality::NONE),
        Attribute::new(AttributeId::AirflowDirection as _, Access::RWVM, Quality::NONE),
    ),
    commands: commands!(
        // Step command - no response (DefaultSuccess via Ok(()))
        Command::new(CommandId::Step as _, None, Access::WO),
    ),
    with_attrs: with_fan_attrs,
    with_cmds: with_fan_cmds,
};

/// Cluster definition for a device with `features`.
pub const fn cluster(features: Feature) -> Cluster<'static> {
    CLUSTER.with_features(features.bits())
}

fn to_matter_error(status: ClusterStatus) -> Error {
    let code = match status {
        ClusterStatus::ConstraintError => ErrorCode::ConstraintError,
        ClusterStatus::InvalidCommand => ErrorCode::InvalidCommand,
        ClusterStatus::UnsupportedCommand => ErrorCode::CommandNotFound,
        ClusterStatus::UnsupportedAttribute => ErrorCode::AttributeNotFound,
        ClusterStatus::UnsupportedWrite => ErrorCode::UnsupportedAccess,
        ClusterStatus::UnsupportedEndpoint => ErrorCode::EndpointNotFound,
        ClusterStatus::InvalidInState => ErrorCode::InvalidState,
        ClusterStatus::Failure | ClusterStatus::ClusterSpecific(_) => ErrorCode::Failure,
    };
    Error::new(code)
}

/// Handler that bridges a FanControlClusterLogic to rs-matter
pub struct FanControlHandler {
    dataver: Dataver,
    cluster: Cluster<'static>,
    logic: Arc<RwLock<FanControlClusterLogic>>,
    /// Logic change counter the dataver was last bumped for
    seen_version: AtomicU32,
}

impl FanControlHandler {
    /// Create a handler for an initialized logic instance.
    pub fn new(dataver: Dataver, logic: Arc<RwLock<FanControlClusterLogic>>) -> Self {
        let (features, version) = {
            let logic = logic.read();
            (logic.capabilities().supported_features, logic.version())
        };
        Self {
            dataver,
            cluster: cluster(features),
            logic,
            seen_version: AtomicU32::new(version),
        }
    }

    pub fn cluster(&self) -> &Cluster<'static> {
        &self.cluster
    }

    /// Bump the dataver if the logic changed since the last sync.
    ///
    /// Changes also come from Step, pattern ticks and driver reports, not only
    /// from writes through this handler.
    fn sync_dataver(&self, logic: &FanControlClusterLogic) {
        let version = logic.version();
        if self.seen_version.swap(version, Ordering::SeqCst) != version {
            self.dataver.changed();
        }
    }

    fn read_impl(&self, ctx: impl ReadContext, reply: impl ReadReply) -> Result<(), Error> {
        let attr = ctx.attr();
        let logic = self.logic.read();
        self.sync_dataver(&logic);

        // Get the dataver-aware writer
        let Some(writer) = reply.with_dataver(self.dataver.get())? else {
            return Ok(()); // No update needed (dataver match)
        };

        // Handle global attributes via the cluster definition
        if attr.is_system() {
            return self.cluster.read(attr, writer);
        }

        let attribute: AttributeId = attr.attr_id.try_into()?;
        let value = logic
            .read_attribute(attribute)
            .map_err(to_matter_error)?;
        writer.set(value.to_raw())
    }

    fn write_impl(&self, ctx: impl WriteContext) -> Result<(), Error> {
        let attr = ctx.attr();
        let data = ctx.data();

        // Verify dataver
        attr.check_dataver(self.dataver.get())?;

        let attribute: AttributeId = attr.attr_id.try_into()?;
        let mut logic = self.logic.write();
        if !logic.is_attribute_supported(attribute) {
            return Err(ErrorCode::AttributeNotFound.into());
        }
        if !attribute.is_writable() {
            // Read-only attribute - writes not supported
            return Err(ErrorCode::UnsupportedAccess.into());
        }

        let raw: u8 = data.u8()?;
        let value = AttributeValue::from_raw(attribute, raw).map_err(to_matter_error)?;
        let result = logic.write_attribute(attribute, value);
        self.sync_dataver(&logic);
        result.map_err(|status| {
            debug!("Write of {:?} = {} rejected: {}", attribute, raw, status);
            to_matter_error(status)
        })
    }

    fn invoke_impl(&self, ctx: impl InvokeContext, _reply: impl InvokeReply) -> Result<(), Error> {
        let cmd = ctx.cmd();
        let data = ctx.data();

        match cmd.cmd_id.try_into()? {
            CommandId::Step => {
                let mut seq = data.structure()?;
                // Field 0: direction (required)
                let direction = seq.scan_ctx(0)?.u8()?;
                // Fields 1-4: wrap, lowestOff, speed, rotate (optional)
                let wrap = seq.scan_ctx(1).ok().and_then(|e| e.bool().ok());
                let lowest_off = seq.scan_ctx(2).ok().and_then(|e| e.bool().ok());
                let speed = seq
                    .scan_ctx(3)
                    .ok()
                    .and_then(|e| e.u8().ok())
                    .unwrap_or(0);
                let rotate = seq.scan_ctx(4).ok().and_then(|e| e.u8().ok());

                let request = StepRequest {
                    direction,
                    wrap,
                    lowest_off,
                    speed,
                    rotate,
                };

                let mut logic = self.logic.write();
                let result = logic.handle_step_request(&request);
                self.sync_dataver(&logic);
                result.map_err(|status| {
                    if let Some(code) = status.cluster_code() {
                        warn!("Step failed with cluster status {:?}", code);
                    } else {
                        debug!("Step failed: {}", status);
                    }
                    to_matter_error(status)
                })
            }
        }
    }
}

impl Handler for FanControlHandler {
    fn read(&self, ctx: impl ReadContext, reply: impl ReadReply) -> Result<(), Error> {
        self.read_impl(ctx, reply)
    }

    fn write(&self, ctx: impl WriteContext) -> Result<(), Error> {
        self.write_impl(ctx)
    }

    fn invoke(&self, ctx: impl InvokeContext, reply: impl InvokeReply) -> Result<(), Error> {
        self.invoke_impl(ctx, reply)
    }
}

impl NonBlockingHandler for FanControlHandler {}
