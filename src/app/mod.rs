//! Application orchestration module

pub mod initialization;
pub mod execution;
pub mod repository;

pub use repository::resolve_repository_path;
pub use initialization::{
    load_configuration,
    configure_logging,
    build_analysis_config,
    create_meta_source,
    open_store,
};
pub use execution::{
    run_analysis,
    run_worker,
    read_worker_request,
};
