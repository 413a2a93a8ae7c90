pub mod coordinator;
pub mod dispatcher;
pub mod matcher;

pub use coordinator::Coordinator;
pub use dispatcher::Dispatcher;
pub use matcher::{plan, rank_by_distance, suggest, DispatchBoard, RankedAmbulance, Suggestion};
