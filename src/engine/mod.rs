/*!
Scenario processing engine.

- `state`: counters, event enabled flags, timers and per-loop broadcasts of a running scenario.
- `verifier`: short-circuiting verification of condition lists.
- `actions`: sequential execution of the actions of fulfilled events.
- `processor`: the per-frame loop tying them together.
- `listener`: progress hooks, and `DebugRecorder` building a session report from them.

Typical usage:
```no_run
use std::sync::Arc;
use autotap::config::Scenario;
use autotap::device::{DesktopExecutor, PathBitmapSupplier, RecordedFrame, ReplayDetector};
use autotap::engine::{ProcessOutcome, ScenarioProcessor};

# async fn run(scenario: Scenario, frames: Vec<RecordedFrame>) -> anyhow::Result<()> {
let mut processor = ScenarioProcessor::new(
    scenario,
    ReplayDetector::new(),
    PathBitmapSupplier::new(None),
    Arc::new(DesktopExecutor::new(true)),
);
processor.on_scenario_start();
for frame in &frames {
    if processor.process(frame).await? == ProcessOutcome::StopRequested {
        break;
    }
}
processor.on_scenario_stop();
# Ok(())
# }
```
*/

pub mod actions;
pub mod listener;
pub mod processor;
pub mod results;
pub mod state;
pub mod unblock;
pub mod verifier;

pub use actions::ActionExecutor;
pub use listener::{DebugRecorder, DebugReport, ProcessingListener};
pub use processor::{ProcessOutcome, ScenarioProcessor};
pub use results::{ConditionResult, ConditionsResults};
pub use state::ProcessingState;
pub use unblock::UnblockGestureScheduler;
pub use verifier::ConditionsVerifier;
