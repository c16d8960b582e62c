use metrics::{Counter, Histogram, counter, histogram};

use crate::{breaker::google::Admission, registered_event};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

registered_event! {
    BreakerAdmission { breaker: String } => {
        admitted: Counter = counter!("breaker_requests_total", "breaker" => breaker.clone(), "decision" => "admitted"),
        dropped: Counter = counter!("breaker_requests_total", "breaker" => breaker.clone(), "decision" => "dropped"),
        drop_ratio: Histogram = histogram!("breaker_drop_ratio", "breaker" => breaker.clone()),
    }

    fn emit(&self, admission: Admission) {
        match admission {
            Admission::Admitted { drop_ratio } => {
                self.admitted.increment(1);
                self.drop_ratio.record(drop_ratio);
            }
            Admission::Dropped { drop_ratio } => {
                self.dropped.increment(1);
                self.drop_ratio.record(drop_ratio);
                trace!(target: "adaptive_breaker::stats", drop_ratio, "Request dropped");
            }
        }
    }
}

registered_event! {
    BreakerOutcome { breaker: String } => {
        success: Counter = counter!("breaker_outcomes_total", "breaker" => breaker.clone(), "outcome" => "success"),
        failure: Counter = counter!("breaker_outcomes_total", "breaker" => breaker.clone(), "outcome" => "failure"),
    }

    fn emit(&self, outcome: Outcome) {
        match outcome {
            Outcome::Success => self.success.increment(1),
            Outcome::Failure => self.failure.increment(1),
        }
    }
}
