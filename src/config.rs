use anyhow::{Context, Result, anyhow};
use directories::UserDirs;
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use crate::error::Error;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Meta {
    pub name: Option<String>,
}

/// Candidate tracker tuning. Positions are in signal samples (rows).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerThresholds {
    /// A raw candidate matches a tracked one when their centers differ by less than this.
    pub max_deviation: f32,
    pub position_alpha: f32,
    pub quality_alpha: f32,
    pub trust_alpha: f32,
    /// Starting trust of a freshly seen region, so it cannot outrank established ones.
    pub initial_score_multiplier: f32,
    pub edge_score_ceiling: f32,
    /// Edge score an unmatched candidate decays toward.
    pub not_found_edge_score: f32,
    pub max_edge_score: f32,
    pub min_brightness: f32,
    pub max_candidates: usize,
}

impl Default for TrackerThresholds {
    fn default() -> Self {
        Self {
            max_deviation: 5.0,
            position_alpha: 0.05,
            quality_alpha: 0.10,
            trust_alpha: 0.10,
            initial_score_multiplier: 0.2,
            edge_score_ceiling: 0.001,
            not_found_edge_score: 0.001,
            max_edge_score: 0.0008,
            min_brightness: 0.2,
            max_candidates: 10,
        }
    }
}

/// Gesture recognizer tuning. Landmark coordinates are normalized, y up.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureThresholds {
    pub history_size: usize,
    pub start_threshold: usize,
    pub stop_threshold: usize,
    pub smoothing_alpha: f32,
    pub min_confidence: f32,
    /// Fingertip locations are imprecise; the search window above the region grows by this factor.
    pub active_area_fudge_scale: f32,
    /// Max vertical offset of the ring tip from the index/middle average for a three-finger gesture.
    pub ring_tolerance: f32,
}

impl Default for GestureThresholds {
    fn default() -> Self {
        Self {
            history_size: 6,
            start_threshold: 4,
            stop_threshold: 3,
            smoothing_alpha: 0.3,
            min_confidence: 0.6,
            active_area_fudge_scale: 1.8,
            ring_tolerance: 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    /// Edge magnitude below which a sample counts as smooth surface.
    pub threshold: f32,
    /// Expected share of the frame height covered by the band.
    pub height_fraction_min: f32,
    pub height_fraction_max: f32,
    /// Fingers may reach this far (as a share of the frame) above the region.
    pub roi_top_offset: f32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            threshold: 0.02,
            height_fraction_min: 0.04,
            height_fraction_max: 0.06,
            roi_top_offset: 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlSettings {
    pub volume_scale: f32,
    pub brightness_scale: f32,
    pub initial_volume: f32,
    pub initial_brightness: f32,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            volume_scale: 3.0,
            brightness_scale: 3.0,
            initial_volume: 0.5,
            initial_brightness: 0.5,
        }
    }
}

/// Which control channel each gesture drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Volume,
    Brightness,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Bindings {
    pub two_finger: Channel,
    pub three_finger: Channel,
}

impl Default for Bindings {
    fn default() -> Self {
        Self {
            two_finger: Channel::Volume,
            three_finger: Channel::Brightness,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub tracker: TrackerThresholds,
    #[serde(default)]
    pub gesture: GestureThresholds,
    #[serde(default)]
    pub detector: DetectorSettings,
    #[serde(default)]
    pub control: ControlSettings,
    #[serde(default)]
    pub bindings: Bindings,
}

impl Profile {
    pub fn from_toml(txt: &str) -> Result<Self> {
        let profile: Profile = toml::from_str(txt)?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> std::result::Result<(), Error> {
        let invalid =
            |msg: String| -> std::result::Result<(), Error> { Err(Error::InvalidProfile(msg)) };
        let t = &self.tracker;
        let g = &self.gesture;
        let d = &self.detector;

        for (name, alpha) in [
            ("tracker.position_alpha", t.position_alpha),
            ("tracker.quality_alpha", t.quality_alpha),
            ("tracker.trust_alpha", t.trust_alpha),
            ("gesture.smoothing_alpha", g.smoothing_alpha),
        ] {
            if !(0.0..=1.0).contains(&alpha) {
                return invalid(format!("{name} must be in [0,1], got {alpha}"));
            }
        }
        if t.max_candidates == 0 {
            return invalid("tracker.max_candidates must be at least 1".into());
        }
        if t.max_deviation <= 0.0 {
            return invalid("tracker.max_deviation must be positive".into());
        }
        if t.edge_score_ceiling <= 0.0 {
            return invalid("tracker.edge_score_ceiling must be positive".into());
        }
        if !(0.0..=1.0).contains(&t.initial_score_multiplier) {
            return invalid("tracker.initial_score_multiplier must be in [0,1]".into());
        }

        if g.history_size == 0 {
            return invalid("gesture.history_size must be at least 1".into());
        }
        for (name, v) in [
            ("gesture.start_threshold", g.start_threshold),
            ("gesture.stop_threshold", g.stop_threshold),
        ] {
            if v == 0 || v > g.history_size {
                return invalid(format!(
                    "{name} must be in 1..={}, got {v}",
                    g.history_size
                ));
            }
        }
        if g.active_area_fudge_scale < 1.0 {
            return invalid("gesture.active_area_fudge_scale must be >= 1".into());
        }

        if !(0.0..1.0).contains(&d.height_fraction_min)
            || !(0.0..=1.0).contains(&d.height_fraction_max)
            || d.height_fraction_min > d.height_fraction_max
        {
            return invalid(
                "detector.height_fraction_min..height_fraction_max must be an ordered range in [0,1]"
                    .into(),
            );
        }
        Ok(())
    }
}

/// On-disk profile store: `~/.config/virtualbar/profiles/*.toml` plus an
/// `active` pointer file naming the current profile.
#[derive(Debug, Clone)]
pub struct ConfigState {
    pub active_name: String,
    pub profile: Profile,
    pub config_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub active_ptr: PathBuf,
}

fn config_dir() -> Result<PathBuf> {
    let home = UserDirs::new()
        .ok_or_else(|| anyhow!("cannot determine home directory"))?
        .home_dir()
        .to_path_buf();
    Ok(home.join(".config").join("virtualbar"))
}

fn default_profile_text() -> &'static str {
    include_str!("../profiles/default.toml")
}

impl ConfigState {
    pub fn load_or_install_default() -> Result<Self> {
        Self::open(config_dir()?)
    }

    /// Open (and seed if needed) a profile store rooted at `cfgdir`.
    pub fn open(cfgdir: PathBuf) -> Result<Self> {
        let profdir = cfgdir.join("profiles");
        fs::create_dir_all(&profdir)
            .with_context(|| format!("creating {}", profdir.display()))?;

        let def_path = profdir.join("default.toml");
        if !def_path.exists() {
            fs::write(&def_path, default_profile_text())?;
            info!("installed default profile at {}", def_path.display());
        }

        let active_ptr = cfgdir.join("active");
        if !active_ptr.exists() {
            let mut f = fs::File::create(&active_ptr)?;
            f.write_all(b"default")?;
        }

        let active_name = fs::read_to_string(&active_ptr)?.trim().to_string();
        let profile = load_profile(&profdir, &active_name)?;

        Ok(Self {
            active_name,
            profile,
            config_dir: cfgdir,
            profiles_dir: profdir,
            active_ptr,
        })
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        let p = self.profiles_dir.join(format!("{name}.toml"));
        if !p.exists() {
            return Err(anyhow!("profile not found: {}", p.display()));
        }
        // validate before moving the pointer
        let profile = load_profile(&self.profiles_dir, name)?;
        fs::write(&self.active_ptr, name.as_bytes())?;
        self.active_name = name.to_string();
        self.profile = profile;
        info!("switched active profile to {name}");
        Ok(())
    }

    /// Load a named profile without changing the active pointer.
    pub fn profile_named(&self, name: &str) -> Result<Profile> {
        load_profile(&self.profiles_dir, name)
    }

    pub fn list_profiles(&self) -> Vec<String> {
        let mut v = Vec::new();
        if let Ok(rd) = fs::read_dir(&self.profiles_dir) {
            for e in rd.flatten() {
                let path = e.path();
                if path.extension().is_some_and(|ext| ext == "toml") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        v.push(stem.to_string());
                    }
                }
            }
        }
        v.sort();
        v
    }
}

fn load_profile(profiles_dir: &Path, name: &str) -> Result<Profile> {
    let path = profiles_dir.join(format!("{name}.toml"));
    let txt = fs::read_to_string(&path)
        .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
    Profile::from_toml(&txt).with_context(|| format!("failed to load {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_default_profile_parses() {
        let p = Profile::from_toml(default_profile_text()).unwrap();
        assert_eq!(p.gesture.history_size, 6);
        assert_eq!(p.tracker.max_candidates, 10);
        assert_eq!(p.bindings.two_finger, Channel::Volume);
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let p = Profile::from_toml("[gesture]\nstart_threshold = 3\n").unwrap();
        assert_eq!(p.gesture.start_threshold, 3);
        assert_eq!(p.gesture.stop_threshold, 3);
        assert_eq!(p.detector.threshold, 0.02);
        assert_eq!(p.bindings.three_finger, Channel::Brightness);
    }

    #[test]
    fn rejects_threshold_above_history() {
        let err = Profile::from_toml("[gesture]\nhistory_size = 4\nstart_threshold = 5\n")
            .unwrap_err()
            .to_string();
        assert!(err.contains("start_threshold"), "{err}");
    }

    #[test]
    fn rejects_zero_candidate_cap() {
        assert!(Profile::from_toml("[tracker]\nmax_candidates = 0\n").is_err());
    }

    #[test]
    fn parses_bindings() {
        let p = Profile::from_toml("[bindings]\ntwo_finger = \"brightness\"\nthree_finger = \"none\"\n")
            .unwrap();
        assert_eq!(p.bindings.two_finger, Channel::Brightness);
        assert_eq!(p.bindings.three_finger, Channel::None);
    }

    #[test]
    fn store_installs_default_and_switches_profiles() {
        let dir = std::env::temp_dir().join(format!("virtualbar-cfg-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);

        let mut st = ConfigState::open(dir.clone()).unwrap();
        assert_eq!(st.active_name, "default");
        assert_eq!(st.list_profiles(), vec!["default".to_string()]);

        fs::write(
            st.profiles_dir.join("tight.toml"),
            "[gesture]\nstart_threshold = 2\n",
        )
        .unwrap();
        st.set_active("tight").unwrap();
        assert_eq!(st.profile.gesture.start_threshold, 2);
        assert_eq!(fs::read_to_string(&st.active_ptr).unwrap(), "tight");
        assert!(st.set_active("missing").is_err());

        let _ = fs::remove_dir_all(&dir);
    }
}
