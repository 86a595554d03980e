use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

/// Reasons a submitted completion payload is rejected before touching state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ContentValidationError {
    #[error("malformed completion payload: {0}")]
    Malformed(String),

    #[error("actual duration must be a non-negative whole number of minutes, got {0}")]
    InvalidActualDuration(i64),

    #[error("exercise #{index} is missing a name")]
    MissingExerciseName { index: usize },

    #[error("exercise #{exercise} set #{set}: {field} must be a non-negative number")]
    InvalidSetValue {
        exercise: usize,
        set: usize,
        field: &'static str,
    },

    #[error("exercise #{exercise} set #{set}: {field} exceeds {max}")]
    SetValueTooLarge {
        exercise: usize,
        set: usize,
        field: &'static str,
        max: u64,
    },

    #[error("a completion holds at most {max} sets")]
    TooManySets { max: usize },
}

/// Heaviest load accepted for a single set, in whole units.
pub const MAX_SET_WEIGHT: u64 = 10_000;
/// Most repetitions accepted for a single set.
pub const MAX_SET_REPS: u32 = 10_000;
/// Most sets accepted across all exercises of one completion.
pub const MAX_SETS_PER_COMPLETION: usize = 1_000;

//
// ─── WEIGHT ───────────────────────────────────────────────────────────────────
//

/// A load expressed in thousandths of a unit.
///
/// Totals are kept in fixed point so that adding a completion and later
/// removing it restores the previous total exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Weight(u64);

impl Weight {
    pub const ZERO: Weight = Weight(0);

    /// Number of stored units per whole unit of weight.
    pub const SCALE: u64 = 1_000;

    #[must_use]
    pub fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Converts a user-entered weight, rounding to the nearest thousandth.
    ///
    /// Returns `None` for negative, NaN, or infinite values.
    #[must_use]
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let millis = (value * 1_000.0).round() as u64;
        Some(Self(millis))
    }

    #[must_use]
    pub fn millis(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn as_f64(self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let millis = self.0 as f64;
        millis / 1_000.0
    }

    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub fn saturating_add(self, other: Weight) -> Weight {
        Weight(self.0.saturating_add(other.0))
    }

    #[must_use]
    pub fn saturating_mul(self, factor: u64) -> Weight {
        Weight(self.0.saturating_mul(factor))
    }
}

impl Serialize for Weight {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

//
// ─── DRAFTS ───────────────────────────────────────────────────────────────────
//

/// Unvalidated set as it arrives from a client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetDraft {
    pub reps: Option<i64>,
    pub weight: Option<f64>,
    pub duration: Option<i64>,
    pub distance: Option<f64>,
    pub completed: Option<bool>,
}

impl SetDraft {
    /// A reps-and-weight set, the common shape for strength work.
    #[must_use]
    pub fn strength(reps: i64, weight: f64, completed: bool) -> Self {
        Self {
            reps: Some(reps),
            weight: Some(weight),
            duration: None,
            distance: None,
            completed: Some(completed),
        }
    }

    fn validate(self, exercise: usize, set: usize) -> Result<SetEntry, ContentValidationError> {
        let invalid = |field| ContentValidationError::InvalidSetValue {
            exercise,
            set,
            field,
        };

        let too_large = |field, max| ContentValidationError::SetValueTooLarge {
            exercise,
            set,
            field,
            max,
        };

        let reps = whole(self.reps).ok_or_else(|| invalid("reps"))?;
        if reps > MAX_SET_REPS {
            return Err(too_large("reps", u64::from(MAX_SET_REPS)));
        }
        let duration = whole(self.duration).ok_or_else(|| invalid("duration"))?;
        let weight = Weight::from_f64(self.weight.unwrap_or(0.0)).ok_or_else(|| invalid("weight"))?;
        if weight > Weight::from_millis(MAX_SET_WEIGHT * Weight::SCALE) {
            return Err(too_large("weight", MAX_SET_WEIGHT));
        }
        let distance = self.distance.unwrap_or(0.0);
        if !distance.is_finite() || distance < 0.0 {
            return Err(invalid("distance"));
        }

        Ok(SetEntry {
            reps,
            weight,
            duration,
            distance,
            completed: self.completed.unwrap_or(false),
        })
    }
}

fn whole(value: Option<i64>) -> Option<u32> {
    u32::try_from(value.unwrap_or(0)).ok()
}

/// Unvalidated exercise as it arrives from a client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseDraft {
    pub name: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub sets: Vec<SetDraft>,
}

impl ExerciseDraft {
    #[must_use]
    pub fn new(name: impl Into<String>, category: impl Into<String>, sets: Vec<SetDraft>) -> Self {
        Self {
            name: Some(name.into()),
            category: Some(category.into()),
            sets,
        }
    }

    /// Validate a single exercise; `index` is used only for error reporting.
    ///
    /// # Errors
    ///
    /// Returns `ContentValidationError` if the name is blank or a set is invalid.
    pub fn validate(self, index: usize) -> Result<Exercise, ContentValidationError> {
        let name = self
            .name
            .map(|n| n.trim().to_owned())
            .filter(|n| !n.is_empty())
            .ok_or(ContentValidationError::MissingExerciseName { index })?;

        let sets = self
            .sets
            .into_iter()
            .enumerate()
            .map(|(set, draft)| draft.validate(index, set))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Exercise {
            name,
            category: self.category.unwrap_or_default().trim().to_owned(),
            sets,
        })
    }
}

/// Unvalidated completion payload.
///
/// Deserialized leniently (missing fields are allowed) and then checked by
/// [`CompletionDraft::validate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionDraft {
    pub actual_duration: Option<i64>,
    pub notes: Option<String>,
    #[serde(default)]
    pub exercises: Vec<ExerciseDraft>,
}

impl CompletionDraft {
    #[must_use]
    pub fn new(
        actual_duration: i64,
        notes: impl Into<String>,
        exercises: Vec<ExerciseDraft>,
    ) -> Self {
        Self {
            actual_duration: Some(actual_duration),
            notes: Some(notes.into()),
            exercises,
        }
    }

    /// Parse a JSON payload. Wrong types (e.g. `"reps": "ten"`) are rejected here.
    ///
    /// # Errors
    ///
    /// Returns `ContentValidationError::Malformed` if the JSON does not match the payload shape.
    pub fn from_json(raw: &str) -> Result<Self, ContentValidationError> {
        serde_json::from_str(raw).map_err(|e| ContentValidationError::Malformed(e.to_string()))
    }

    /// Validate into a `CompletionContent`.
    ///
    /// # Errors
    ///
    /// Returns `ContentValidationError` for negative, non-finite, or oversized
    /// values and for exercises without a name.
    pub fn validate(self) -> Result<CompletionContent, ContentValidationError> {
        let set_count: usize = self.exercises.iter().map(|e| e.sets.len()).sum();
        if set_count > MAX_SETS_PER_COMPLETION {
            return Err(ContentValidationError::TooManySets {
                max: MAX_SETS_PER_COMPLETION,
            });
        }

        let raw_duration = self.actual_duration.unwrap_or(0);
        let actual_duration = u32::try_from(raw_duration)
            .map_err(|_| ContentValidationError::InvalidActualDuration(raw_duration))?;

        let exercises = self
            .exercises
            .into_iter()
            .enumerate()
            .map(|(index, draft)| draft.validate(index))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CompletionContent {
            actual_duration,
            notes: self.notes.unwrap_or_default(),
            exercises,
        })
    }
}

//
// ─── VALIDATED CONTENT ────────────────────────────────────────────────────────
//

/// One performed set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetEntry {
    reps: u32,
    weight: Weight,
    duration: u32,
    distance: f64,
    completed: bool,
}

impl SetEntry {
    #[must_use]
    pub fn reps(&self) -> u32 {
        self.reps
    }

    #[must_use]
    pub fn weight(&self) -> Weight {
        self.weight
    }

    #[must_use]
    pub fn duration(&self) -> u32 {
        self.duration
    }

    #[must_use]
    pub fn distance(&self) -> f64 {
        self.distance
    }

    #[must_use]
    pub fn completed(&self) -> bool {
        self.completed
    }

    fn to_draft(&self) -> SetDraft {
        SetDraft {
            reps: Some(i64::from(self.reps)),
            weight: Some(self.weight.as_f64()),
            duration: Some(i64::from(self.duration)),
            distance: Some(self.distance),
            completed: Some(self.completed),
        }
    }
}

/// A named exercise with its ordered sets.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    name: String,
    category: String,
    sets: Vec<SetEntry>,
}

impl Exercise {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    #[must_use]
    pub fn sets(&self) -> &[SetEntry] {
        &self.sets
    }

    #[must_use]
    pub fn to_draft(&self) -> ExerciseDraft {
        ExerciseDraft {
            name: Some(self.name.clone()),
            category: Some(self.category.clone()),
            sets: self.sets.iter().map(SetEntry::to_draft).collect(),
        }
    }
}

/// Validated description of one performance of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionContent {
    actual_duration: u32,
    notes: String,
    exercises: Vec<Exercise>,
}

impl CompletionContent {
    /// Minutes actually spent, as reported by the user.
    #[must_use]
    pub fn actual_duration(&self) -> u32 {
        self.actual_duration
    }

    #[must_use]
    pub fn notes(&self) -> &str {
        &self.notes
    }

    #[must_use]
    pub fn exercises(&self) -> &[Exercise] {
        &self.exercises
    }

    /// Every set across all exercises, in order.
    pub fn sets(&self) -> impl Iterator<Item = &SetEntry> {
        self.exercises.iter().flat_map(|e| e.sets.iter())
    }

    /// Convert back into the wire shape, e.g. for persistence.
    #[must_use]
    pub fn to_draft(&self) -> CompletionDraft {
        CompletionDraft {
            actual_duration: Some(i64::from(self.actual_duration)),
            notes: Some(self.notes.clone()),
            exercises: self.exercises.iter().map(Exercise::to_draft).collect(),
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_payload() {
        let raw = r#"{
            "actualDuration": 45,
            "notes": "felt strong",
            "exercises": [
                { "name": "Squat", "category": "legs", "sets": [
                    { "reps": 5, "weight": 100.5, "duration": 0, "distance": 0, "completed": true },
                    { "reps": 5, "weight": 100.5 }
                ]}
            ]
        }"#;
        let content = CompletionDraft::from_json(raw).unwrap().validate().unwrap();

        assert_eq!(content.actual_duration(), 45);
        assert_eq!(content.notes(), "felt strong");
        let sets: Vec<_> = content.sets().collect();
        assert_eq!(sets.len(), 2);
        assert!(sets[0].completed());
        assert!(!sets[1].completed());
        assert_eq!(sets[0].weight(), Weight::from_millis(100_500));
    }

    #[test]
    fn missing_fields_default_to_zero() {
        let content = CompletionDraft::from_json("{}").unwrap().validate().unwrap();
        assert_eq!(content.actual_duration(), 0);
        assert_eq!(content.notes(), "");
        assert!(content.exercises().is_empty());
    }

    #[test]
    fn non_numeric_reps_are_malformed() {
        let raw = r#"{ "exercises": [ { "name": "Row", "sets": [ { "reps": "ten" } ] } ] }"#;
        let err = CompletionDraft::from_json(raw).unwrap_err();
        assert!(matches!(err, ContentValidationError::Malformed(_)));
    }

    #[test]
    fn negative_duration_is_rejected() {
        let err = CompletionDraft::new(-5, "", Vec::new()).validate().unwrap_err();
        assert_eq!(err, ContentValidationError::InvalidActualDuration(-5));
    }

    #[test]
    fn negative_weight_reports_position() {
        let draft = CompletionDraft::new(
            10,
            "",
            vec![
                ExerciseDraft::new("Bench", "push", vec![SetDraft::strength(5, 60.0, true)]),
                ExerciseDraft::new(
                    "Row",
                    "pull",
                    vec![SetDraft::strength(5, 40.0, true), SetDraft::strength(5, -1.0, true)],
                ),
            ],
        );
        let err = draft.validate().unwrap_err();
        assert_eq!(
            err,
            ContentValidationError::InvalidSetValue {
                exercise: 1,
                set: 1,
                field: "weight"
            }
        );
    }

    #[test]
    fn blank_exercise_name_is_rejected() {
        let draft =
            CompletionDraft::new(10, "", vec![ExerciseDraft::new("  ", "misc", Vec::new())]);
        let err = draft.validate().unwrap_err();
        assert_eq!(err, ContentValidationError::MissingExerciseName { index: 0 });
    }

    #[test]
    fn non_finite_distance_is_rejected() {
        let mut set = SetDraft::strength(1, 0.0, true);
        set.distance = Some(f64::NAN);
        let draft =
            CompletionDraft::new(10, "", vec![ExerciseDraft::new("Run", "cardio", vec![set])]);
        assert!(matches!(
            draft.validate().unwrap_err(),
            ContentValidationError::InvalidSetValue { field: "distance", .. }
        ));
    }

    #[test]
    fn draft_conversion_preserves_content() {
        let draft = CompletionDraft::new(
            30,
            "easy day",
            vec![ExerciseDraft::new("Deadlift", "legs", vec![SetDraft::strength(3, 140.25, true)])],
        );
        let content = draft.validate().unwrap();
        let again = content.to_draft().validate().unwrap();
        assert_eq!(again, content);
    }

    #[test]
    fn weight_rounds_to_thousandths() {
        assert_eq!(Weight::from_f64(2.0004), Some(Weight::from_millis(2_000)));
        assert_eq!(Weight::from_f64(-0.5), None);
        assert_eq!(Weight::from_f64(f64::INFINITY), None);
        assert!((Weight::from_millis(1_500_000).as_f64() - 1500.0).abs() < f64::EPSILON);
    }

    #[test]
    fn absurd_loads_are_rejected_before_any_total_moves() {
        let draft = CompletionDraft::new(
            10,
            "",
            vec![ExerciseDraft::new("Press", "push", vec![SetDraft::strength(10, 1e15, true)])],
        );
        assert_eq!(
            draft.validate().unwrap_err(),
            ContentValidationError::SetValueTooLarge {
                exercise: 0,
                set: 0,
                field: "weight",
                max: MAX_SET_WEIGHT,
            }
        );

        let draft = CompletionDraft::new(
            10,
            "",
            vec![ExerciseDraft::new(
                "Jump rope",
                "cardio",
                vec![SetDraft::strength(50_000, 0.0, true)],
            )],
        );
        assert!(matches!(
            draft.validate().unwrap_err(),
            ContentValidationError::SetValueTooLarge { field: "reps", .. }
        ));
    }

    #[test]
    fn heaviest_accepted_set_fits() {
        let heaviest = SetDraft::strength(i64::from(MAX_SET_REPS), 10_000.0, true);
        let content =
            CompletionDraft::new(0, "", vec![ExerciseDraft::new("Sled", "legs", vec![heaviest])])
                .validate()
                .unwrap();
        assert_eq!(content.sets().count(), 1);
    }

    #[test]
    fn set_count_is_bounded() {
        let sets = vec![SetDraft::strength(1, 1.0, true); MAX_SETS_PER_COMPLETION + 1];
        let draft = CompletionDraft::new(0, "", vec![ExerciseDraft::new("Curl", "pull", sets)]);
        assert!(matches!(
            draft.validate().unwrap_err(),
            ContentValidationError::TooManySets { .. }
        ));
    }
}
