pub mod episode;
pub mod episode_topic;
pub mod feed;
pub mod newsletter;
pub mod pipeline_run;
pub mod story_arc;
pub mod topic;

pub use episode::*;
pub use episode_topic::*;
pub use feed::*;
pub use newsletter::*;
pub use pipeline_run::*;
pub use story_arc::*;
pub use topic::*;
