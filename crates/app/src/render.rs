use std::fmt::Write as _;

use course_core::model::{DayProgress, MarkOutcome, ProgressSummary, WeekProgress};
use services::ImportReport;

pub fn summary(summary: &ProgressSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Overall: {}% ({}/{} challenges, {} XP)",
        summary.overall_percent,
        summary.completed_challenges,
        summary.total_challenges,
        summary.total_xp
    );
    let _ = writeln!(out, "Current challenge: {}", summary.current_challenge);
    for week in &summary.weeks {
        let _ = writeln!(out, "  {}", week_line(week));
    }
    out
}

pub fn week(week: &WeekProgress) -> String {
    week_line(week)
}

fn week_line(week: &WeekProgress) -> String {
    format!(
        "Week {}: {}/{} challenges across {} day(s)",
        week.week, week.completed_challenges, week.total_challenges, week.total_days
    )
}

pub fn day(day: &DayProgress) -> String {
    let marker = if day.is_complete() { " [done]" } else { "" };
    format!(
        "Week {} day {}: {}/{} challenges{marker}",
        day.week, day.day, day.completed_challenges, day.total_challenges
    )
}

pub fn mark_outcome(challenge: &str, outcome: &MarkOutcome, current: &str) -> String {
    match outcome {
        MarkOutcome::AlreadyCompleted => format!("{challenge} was already completed"),
        MarkOutcome::Completed {
            advanced_to: Some(next),
        } => format!("completed {challenge}; next up: {next}"),
        MarkOutcome::Completed { advanced_to: None } => {
            format!("completed {challenge}; current challenge stays {current}")
        }
    }
}

pub fn import_report(report: &ImportReport) -> String {
    let mut line = format!("imported {} new challenge(s)", report.added);
    if report.dropped > 0 {
        let _ = write!(line, ", ignored {} unknown id(s)", report.dropped);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::model::ChallengeId;

    #[test]
    fn summary_lists_every_week() {
        let value = ProgressSummary {
            overall_percent: 33,
            completed_challenges: 1,
            total_challenges: 3,
            total_xp: 10,
            current_challenge: ChallengeId::new("w1-d1-c2").unwrap(),
            weeks: vec![WeekProgress {
                week: 1,
                total_days: 2,
                total_challenges: 3,
                completed_challenges: 1,
            }],
        };

        let text = summary(&value);
        assert!(text.starts_with("Overall: 33% (1/3 challenges, 10 XP)"));
        assert!(text.contains("Current challenge: w1-d1-c2"));
        assert!(text.contains("Week 1: 1/3 challenges across 2 day(s)"));
    }

    #[test]
    fn completed_day_is_marked() {
        let done = DayProgress {
            day: 2,
            week: 1,
            total_challenges: 1,
            completed_challenges: 1,
        };
        assert_eq!(day(&done), "Week 1 day 2: 1/1 challenges [done]");
    }

    #[test]
    fn outcomes_read_naturally() {
        let next = ChallengeId::new("w1-d1-c2").unwrap();
        assert_eq!(
            mark_outcome(
                "w1-d1-c1",
                &MarkOutcome::Completed {
                    advanced_to: Some(next)
                },
                "w1-d1-c2"
            ),
            "completed w1-d1-c1; next up: w1-d1-c2"
        );
        assert_eq!(
            mark_outcome("w1-d1-c1", &MarkOutcome::AlreadyCompleted, "w1-d1-c2"),
            "w1-d1-c1 was already completed"
        );
        assert_eq!(
            import_report(&ImportReport {
                added: 2,
                dropped: 1
            }),
            "imported 2 new challenge(s), ignored 1 unknown id(s)"
        );
    }
}
