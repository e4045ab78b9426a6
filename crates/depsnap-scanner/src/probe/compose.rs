//! Images of the services in a compose project

use super::{LocationResult, Probe, ProbeContext, ProbeOutput};
use crate::channel::CommandChannel;
use crate::types::{Dependencies, Dependency, Scope};

/// Reports one dependency per compose service: its image and image id
#[derive(Debug, Default, Clone, Copy)]
pub struct ComposeProbe;

impl Probe for ComposeProbe {
    fn name(&self) -> &'static str {
        "docker-compose"
    }

    fn is_usable(&self, channel: &dyn CommandChannel, _ctx: &ProbeContext<'_>) -> bool {
        !channel.compose_services().is_empty()
    }

    fn has_system_scope(&self, _channel: &dyn CommandChannel, _ctx: &ProbeContext<'_>) -> bool {
        false
    }

    fn get_dependencies(
        &self,
        channel: &dyn CommandChannel,
        ctx: &ProbeContext<'_>,
    ) -> ProbeOutput {
        let dependencies: Dependencies = channel
            .compose_services()
            .iter()
            .map(|service| {
                let hash = Some(service.image_id.clone())
                    .filter(|id| ctx.collect_hashes() && !id.is_empty());
                (
                    service.service.clone(),
                    Dependency::new(service.image.clone()).with_hash(hash),
                )
            })
            .collect();

        ProbeOutput::single(LocationResult {
            scope: Scope::Compose,
            location: None,
            hash: None,
            dependencies,
        })
    }
}
