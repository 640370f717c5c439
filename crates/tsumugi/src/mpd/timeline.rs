use super::Diagnostic;

/// Fragments one representation may describe. Far above any real episode,
/// low enough that expanding the plan stays cheap.
pub const MAX_FRAGMENTS: u64 = 100_000;

/// One `S` entry of a `SegmentTimeline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentTimelineRun {
    pub repeat_count: u64,
}

impl SegmentTimelineRun {
    /// Parses the `r` attribute of an `S` entry. A missing attribute means the
    /// entry describes a single fragment.
    ///
    /// Negative repeats ("until the next entry") are not supported, nor are
    /// repeats beyond [`MAX_FRAGMENTS`].
    pub fn parse(repeat: Option<&str>) -> Result<Self, String> {
        let Some(repeat) = repeat else {
            return Ok(Self { repeat_count: 0 });
        };

        let repeat_count = repeat
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("invalid repeat value r={repeat:?}"))?;
        if repeat_count >= MAX_FRAGMENTS {
            return Err(format!(
                "repeat value r={repeat_count} exceeds {MAX_FRAGMENTS} fragments"
            ));
        }
        Ok(Self { repeat_count })
    }

    pub fn fragments(&self) -> u64 {
        self.repeat_count.saturating_add(1)
    }
}

/// Sums the fragments described by the `r` attributes of a timeline. Invalid
/// entries, and entries that would take the total past [`MAX_FRAGMENTS`],
/// contribute nothing and are reported.
pub(crate) fn count_fragments<'a, I>(
    repeats: I,
    context: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> u64
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut total: u64 = 0;
    for (index, repeat) in repeats.into_iter().enumerate() {
        let counted = SegmentTimelineRun::parse(repeat).and_then(|run| {
            total
                .checked_add(run.fragments())
                .filter(|sum| *sum <= MAX_FRAGMENTS)
                .ok_or_else(|| format!("timeline exceeds {MAX_FRAGMENTS} fragments"))
        });
        match counted {
            Ok(sum) => total = sum,
            Err(message) => {
                diagnostics.push(Diagnostic::new(format!("{context}/S[{index}]"), message))
            }
        }
    }
    total
}
