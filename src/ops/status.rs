use crate::model::plan::PlanStatus;

/// Statuses reachable from `from` in one step (not counting `from` itself,
/// which is always allowed).
pub fn available_transitions(from: PlanStatus) -> &'static [PlanStatus] {
    match from {
        PlanStatus::Todo => &[PlanStatus::InProgress],
        PlanStatus::InProgress => &[PlanStatus::Review, PlanStatus::Todo],
        PlanStatus::Review => &[PlanStatus::Completed, PlanStatus::InProgress],
        PlanStatus::Completed => &[PlanStatus::Todo],
    }
}

pub fn can_transition(from: PlanStatus, to: PlanStatus) -> bool {
    from == to || available_transitions(from).contains(&to)
}
