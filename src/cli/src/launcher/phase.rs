use std::fmt;

/// Steps of one launch, in the only order they are ever entered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Init,
    StageInputs,
    StageOutputs,
    Exec,
    UploadRecord,
    Done,
}

impl Phase {
    pub fn next(self) -> Self {
        match self {
            Phase::Init => Phase::StageInputs,
            Phase::StageInputs => Phase::StageOutputs,
            Phase::StageOutputs => Phase::Exec,
            Phase::Exec => Phase::UploadRecord,
            Phase::UploadRecord | Phase::Done => Phase::Done,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Init => "INIT",
            Phase::StageInputs => "STAGE_INPUTS",
            Phase::StageOutputs => "STAGE_OUTPUTS",
            Phase::Exec => "EXEC",
            Phase::UploadRecord => "UPLOAD_RECORD",
            Phase::Done => "DONE",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_advance_in_order_and_stop_at_done() {
        let mut phase = Phase::Init;
        let mut seen = vec![phase.to_string()];
        while phase != Phase::Done {
            phase = phase.next();
            seen.push(phase.to_string());
        }

        assert_eq!(
            seen,
            ["INIT", "STAGE_INPUTS", "STAGE_OUTPUTS", "EXEC", "UPLOAD_RECORD", "DONE"]
        );
        assert_eq!(Phase::Done.next(), Phase::Done);
    }
}
