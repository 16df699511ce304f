pub mod artifact;
pub mod convergence_detector;
pub mod merge_integrator;
pub mod open_item_analyzer;
pub mod phase_machine;
pub mod recovery;
pub mod refinement_pipeline;
pub mod subtask_orchestrator;
pub mod tier_model;

pub use convergence_detector::{ConvergenceDetector, ConvergenceThresholds};
pub use merge_integrator::MergeIntegrator;
pub use open_item_analyzer::OpenItemAnalyzer;
pub use phase_machine::{PhaseEvent, Transition};
pub use recovery::{NextAction, ResumePoint};
pub use refinement_pipeline::{HumanResolution, IterationReport, OpenQuestion, PhaseChange, RefinementPipeline};
pub use subtask_orchestrator::{OrchestratorConfig, SubtaskOrchestrator};
