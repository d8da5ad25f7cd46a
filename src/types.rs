/// Unique record identifier within a collection (stable across runs).
/// Example: `img000001.jpg`
pub type RecordId = String;
/// Identifier for the collection a record came from (acquisition domain).
/// Examples: `synthetic`, `lightbox`, `sunlamp`
pub type SourceId = String;
/// Class/label tag attached to a record; used for class-balanced sampling.
/// Examples: `synthetic`, `satellite`
pub type CategoryId = String;
/// Payload field key.
/// Examples: `q_vbs2tango_true`, `keypoints`, `bbox`
pub type FieldKey = String;
/// File path strings carried inside records and manifests.
/// Example: `images/train/img000001.jpg`
pub type PathString = String;
/// Short discard reason used in validation reports.
/// Examples: `missing field 'bbox'`, `duplicate id`
pub type DiscardReason = String;
