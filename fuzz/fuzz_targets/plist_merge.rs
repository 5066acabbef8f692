#![no_main]

//! Fuzz target for the typed Info.plist merge.

use camino::Utf8Path;
use libfuzzer_sys::fuzz_target;
use pushpatch_edit::plist_merge;
use pushpatch_types::settings::DesiredSetting;

fuzz_target!(|data: &[u8]| {
    let path = Utf8Path::new("Info.plist");
    let settings = vec![
        DesiredSetting::boolean("UnityAddRemoteNotificationCapability", true),
        DesiredSetting::enumeration("UnityNotificationRequestAuthorization", 7),
        DesiredSetting::text("UnityNotificationDefaultCategory", "default"),
    ];

    let Ok((_, Some(edit))) = plist_merge::plist_edit(path, data, &settings, true) else {
        return;
    };
    // Some exotic inputs do not survive an XML round trip; only converged merges are checked.
    if let Ok((outcome, _)) = plist_merge::plist_edit(path, &edit.after, &settings, true) {
        assert!(!outcome.changed);
    }
});
