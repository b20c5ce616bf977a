use cueconfig_fs::NormalizedPath;
use rstest::rstest;

#[rstest]
#[case("a/../b", "b")]
#[case("../a", "a")]
#[case("../../a/b", "a/b")]
#[case("/a/b/../../c", "/c")]
#[case("a\\..\\b", "b")]
#[case("a/./b//c", "a/b/c")]
#[case("", ".")]
#[case("./", ".")]
#[case("/", "/")]
fn test_path_cleaning(#[case] input: &str, #[case] expected: &str) {
    let normalized = NormalizedPath::new(input);
    assert_eq!(normalized.as_str(), expected);
}

#[rstest]
#[case(".", "config.cue", "config.cue")]
#[case("cfg", "app.cue", "cfg/app.cue")]
#[case("/$overlay", "cfg/app.cue", "/$overlay/cfg/app.cue")]
#[case("/$overlay", ".", "/$overlay")]
#[case("/", "a", "/a")]
fn test_join(#[case] base: &str, #[case] segment: &str, #[case] expected: &str) {
    assert_eq!(NormalizedPath::new(base).join(segment).as_str(), expected);
}

#[rstest]
#[case("config.cue", Some("cue"))]
#[case("dir/config.schema.cue", Some("cue"))]
#[case(".hidden", None)]
#[case("noext", None)]
#[case(".", None)]
fn test_extension(#[case] input: &str, #[case] expected: Option<&str>) {
    assert_eq!(NormalizedPath::new(input).extension(), expected);
}

#[test]
fn test_spellings_of_same_location_are_equal() {
    let a = NormalizedPath::new("cfg/./app.cue");
    let b = NormalizedPath::new("cfg//app.cue");
    let c = NormalizedPath::new("cfg\\app.cue");
    assert_eq!(a, b);
    assert_eq!(b, c);
}

#[test]
fn test_components_skip_root() {
    let path = NormalizedPath::new("/$overlay/cfg/app.cue");
    let components: Vec<_> = path.components().collect();
    assert_eq!(components, vec!["$overlay", "cfg", "app.cue"]);
}

#[test]
fn test_parent_chain_ends_at_root() {
    let path = NormalizedPath::new("/a/b");
    let parent = path.parent().unwrap();
    assert_eq!(parent.as_str(), "/a");
    let root = parent.parent().unwrap();
    assert_eq!(root.as_str(), "/");
    assert_eq!(root.parent(), None);
}
