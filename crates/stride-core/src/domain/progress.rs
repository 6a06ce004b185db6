//! Progress reporting predicate.

use super::task::Task;

/// Should a progress report be sent now?
///
/// Evaluated after the current step has been marked completed. Depends only on
/// the aggregate completed-step count, so re-deriving it from persisted state
/// after a restart gives the same answer.
pub fn should_report_progress(task: &Task) -> bool {
    let completed = task.completed_steps();
    let every = task.report_every_steps as usize;
    every > 0 && completed > 0 && completed % every == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_task, ts};
    use rstest::rstest;

    #[rstest]
    #[case::every_step_after_first(1, 1, true)]
    #[case::every_step_after_third(1, 3, true)]
    #[case::batch_not_reached(2, 1, false)]
    #[case::batch_reached(2, 2, true)]
    #[case::batch_between(2, 3, false)]
    #[case::batch_second_multiple(2, 4, true)]
    #[case::nothing_completed(1, 0, false)]
    #[case::zero_cadence_never_reports(0, 2, false)]
    fn reports_on_positive_multiples(
        #[case] every: u32,
        #[case] completed: usize,
        #[case] expected: bool,
    ) {
        let mut task = sample_task(5);
        task.report_every_steps = every;
        for n in 0..completed {
            task.complete_current_step(None, ts(n as i64));
        }

        assert_eq!(should_report_progress(&task), expected);
    }
}
