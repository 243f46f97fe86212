//! Milestone scheduling.

use cm_core::{MigrationStep, Milestone, Schedule, SchedulePolicy};

/// Groups steps into sequential milestones of `policy.milestone_size`.
///
/// Milestone `i` depends on milestone `i - 1`. Every even-indexed milestone
/// is a rollback point. The total duration is the sum of step estimates.
#[must_use]
pub fn schedule(steps: &[MigrationStep], policy: &SchedulePolicy) -> Schedule {
    let size = policy.milestone_size.max(1);

    let milestones: Vec<Milestone> = steps
        .chunks(size)
        .enumerate()
        .map(|(i, chunk)| Milestone {
            id: format!("milestone-{i}"),
            name: format!("Milestone {}: steps {}-{}", i + 1, i * size + 1, i * size + chunk.len()),
            step_ids: chunk.iter().map(|s| s.id.clone()).collect(),
            depends_on: i.checked_sub(1).map(|prev| format!("milestone-{prev}")),
            estimated_duration: chunk.iter().map(|s| s.estimated_time).sum(),
        })
        .collect();

    let rollback_points = milestones
        .iter()
        .step_by(2)
        .map(|m| m.id.clone())
        .collect();

    Schedule {
        estimated_duration: steps.iter().map(|s| s.estimated_time).sum(),
        milestones,
        rollback_points,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cm_core::StepType;

    fn steps(n: usize) -> Vec<MigrationStep> {
        (0..n)
            .map(|i| {
                let mut step = MigrationStep::new(&format!("s{i}"), StepType::CodeTransformation, "a.js");
                step.estimated_time = 10 + i as u64;
                step
            })
            .collect()
    }

    #[test]
    fn test_milestones_of_five() {
        let plan_steps = steps(12);
        let schedule = schedule(&plan_steps, &SchedulePolicy::default());

        let sizes: Vec<_> = schedule.milestones.iter().map(|m| m.step_ids.len()).collect();
        assert_eq!(sizes, vec![5, 5, 2]);
        assert_eq!(schedule.milestones[0].depends_on, None);
        assert_eq!(schedule.milestones[2].depends_on.as_deref(), Some("milestone-1"));
        assert_eq!(schedule.rollback_points, vec!["milestone-0", "milestone-2"]);
        assert_eq!(schedule.milestones[2].name, "Milestone 3: steps 11-12");
    }

    #[test]
    fn test_duration_is_sum_of_steps() {
        for n in [0, 1, 5, 7, 23] {
            let plan_steps = steps(n);
            let schedule = schedule(&plan_steps, &SchedulePolicy::default());
            let expected: u64 = plan_steps.iter().map(|s| s.estimated_time).sum();
            assert_eq!(schedule.estimated_duration, expected);
            let by_milestone: u64 = schedule.milestones.iter().map(|m| m.estimated_duration).sum();
            assert_eq!(by_milestone, expected);
        }
    }

    #[test]
    fn test_scheduling_is_deterministic() {
        let plan_steps = steps(17);
        let policy = SchedulePolicy::default();
        assert_eq!(schedule(&plan_steps, &policy), schedule(&plan_steps, &policy));
    }

    #[test]
    fn test_empty_plan_has_no_milestones() {
        let schedule = schedule(&[], &SchedulePolicy::default());
        assert!(schedule.milestones.is_empty());
        assert!(schedule.rollback_points.is_empty());
        assert_eq!(schedule.estimated_duration, 0);
    }
}
