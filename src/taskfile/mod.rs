//! Taskfile documents
//!
//! Reading documents in any supported format, the include registry, and
//! flattening includes into a single catalog.

pub mod assemble;
pub mod included;
pub mod read;
pub mod types;

pub use assemble::{assemble, DEFAULT_TASK, NAMESPACE_SEPARATOR};
pub use included::{IncludedTaskfile, IncludedTaskfiles};
pub use read::{load_catalog, load_file, load_shared_vars, read_taskfile, read_taskvars, Format, TASKFILE, TASKVARS};
pub use types::{Cmd, Dep, Task, TaskCatalog, Taskfile, Var, Vars};
