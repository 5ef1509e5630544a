//! PlankWeb backends - the analysis computations behind the task queues.
//!
//! Every backend reads its inputs from the shared artifact store by job id and
//! writes per-chain result documents through the result aggregator:
//! 1. Structure → sequence conversion (PDB parsing)
//! 2. Sequence → structure conversion (remote folding service)
//! 3. Pocket prediction (P2Rank), with and without conservation
//! 4. Structural similarity search (Foldseek) with ligand-contact annotation
//! 5. Conservation scoring
//! 6. Language-model binding prediction

pub mod runner;
pub mod structure;
pub mod context;
pub mod pdb;
pub mod annotate;
pub mod converter;
pub mod p2rank;
pub mod foldseek;
pub mod conservation;
pub mod plm;

use plankweb_common::fetch::FetchClient;
use plankweb_common::PocketProfile;
use plankweb_config::BackendsConfig;
use plankweb_dispatch::{BackendRegistry, DispatchError};
use std::sync::Arc;

pub use annotate::{ContactAnnotator, StructureAnnotator};
pub use context::BackendContext;
pub use runner::ToolRunner;

/// Registry with every backend, wired from configuration.
pub fn standard_registry(
    config: &BackendsConfig,
    ctx: BackendContext,
    client: FetchClient,
) -> Result<BackendRegistry, DispatchError> {
    let annotator: Arc<dyn StructureAnnotator> = Arc::new(ContactAnnotator::new(config.contact_cutoff));
    let fetcher = pdb::StructureFetcher::new(client.clone(), &config.structure_cache);

    let mut registry = BackendRegistry::new();
    registry.register(Arc::new(converter::StrToSeqConverter::new(ctx.clone())))?;
    registry.register(Arc::new(converter::SeqToStrConverter::new(client, &config.esmfold_url, ctx.clone())))?;
    registry.register(Arc::new(p2rank::P2RankBackend::new(
        ToolRunner::new("p2rank", &config.p2rank_executable),
        ctx.clone(),
        PocketProfile::Default,
    )))?;
    registry.register(Arc::new(foldseek::FoldseekBackend::new(
        ToolRunner::new("foldseek", &config.foldseek_executable),
        &config.foldseek_database,
        config.foldseek_max_seqs,
        fetcher,
        annotator,
        ctx.clone(),
    )))?;
    registry.register(Arc::new(conservation::ConservationBackend::new(
        ToolRunner::new("conservation", &config.conservation_executable),
        ctx.clone(),
    )))?;
    registry.register(Arc::new(plm::PlmBackend::new(
        ToolRunner::new("plm", &config.plm_executable),
        config.plm_threshold,
        ctx,
    )))?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use plankweb_common::TaskName;
    use plankweb_store::{ArtifactStore, StoreLayout};

    #[test]
    fn test_standard_registry_covers_every_backend() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = BackendContext::new(Arc::new(ArtifactStore::new(StoreLayout::new(dir.path()), "u")));
        let registry =
            standard_registry(&BackendsConfig::default(), ctx, FetchClient::with_defaults().unwrap()).unwrap();
        assert!(registry.require(&TaskName::BACKENDS).is_ok());
        assert_eq!(registry.len(), 6);
    }
}
