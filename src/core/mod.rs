pub mod cleaning;
pub mod etl;
pub mod modeling;
pub mod pipeline;
pub mod profiling;
pub mod tabular;

pub use crate::domain::model::{CleaningReport, ModelReport, Table, TransformResult};
pub use crate::domain::ports::{Pipeline, Storage};
pub use crate::utils::error::Result;
