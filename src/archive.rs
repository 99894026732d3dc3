//! Extracts the surface archive into a scoped temporary directory.
//!
//! The upstream provider ships surface data as one container holding three
//! datasets, one per ERA5 `stepType`. Containers are recognised by their
//! magic bytes since they usually carry a misleading `.nc` suffix.

use std::{
    collections::BTreeMap,
    fmt,
    fs::{self, File},
    io::{self, Read},
    path::{Component, Path, PathBuf},
};

use flate2::read::GzDecoder;
use tar::Archive;
use tempfile::TempDir;
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// How a member's raw samples represent their quantity.
pub enum MemberRole {
    /// Snapshots, reduced with a daily mean.
    Instant,
    /// Running totals, reduced with a daily sum.
    Accumulated,
    /// Period extremes, reduced with a daily max or min.
    Extreme,
}

impl MemberRole {
    pub const ALL: [MemberRole; 3] = [
        MemberRole::Instant,
        MemberRole::Accumulated,
        MemberRole::Extreme,
    ];

    pub const fn label(&self) -> &'static str {
        match self {
            Self::Instant => "instant",
            Self::Accumulated => "accumulated",
            Self::Extreme => "extreme",
        }
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Member file stems for each role. Extensions are ignored when matching.
pub struct ArchiveLayout {
    pub instant: String,
    pub accumulated: String,
    pub extreme: String,
}

impl Default for ArchiveLayout {
    fn default() -> Self {
        ArchiveLayout {
            instant: "data_stream-oper_stepType-instant".to_string(),
            accumulated: "data_stream-oper_stepType-accum".to_string(),
            extreme: "data_stream-oper_stepType-max".to_string(),
        }
    }
}

impl ArchiveLayout {
    pub fn stem(&self, role: MemberRole) -> &str {
        match role {
            MemberRole::Instant => &self.instant,
            MemberRole::Accumulated => &self.accumulated,
            MemberRole::Extreme => &self.extreme,
        }
    }

    /// The role a member name satisfies, if any.
    pub fn role_of(&self, member: &str) -> Option<MemberRole> {
        let stem = Path::new(member).file_stem()?.to_str()?;
        MemberRole::ALL
            .into_iter()
            .find(|role| self.stem(*role) == stem)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    /// Sniffs the container format from its leading bytes.
    pub fn detect(path: &Path) -> Result<Self> {
        let mut magic = [0u8; 4];
        let mut file = File::open(path).map_err(|e| archive_error(path, e))?;
        let read = file.read(&mut magic).map_err(|e| archive_error(path, e))?;

        match &magic[..read] {
            [0x50, 0x4b, 0x03, 0x04] | [0x50, 0x4b, 0x05, 0x06] => Ok(ArchiveFormat::Zip),
            [0x1f, 0x8b, ..] => Ok(ArchiveFormat::TarGz),
            _ => Err(Error::ArchiveRead(format!(
                "{}: not a zip or tar.gz archive",
                path.display()
            ))),
        }
    }
}

/// The three role members of an extracted archive.
#[derive(Debug)]
pub struct RoleMembers<'a> {
    pub instant: &'a Path,
    pub accumulated: &'a Path,
    pub extreme: &'a Path,
}

/// Extracted members living in a temporary directory, removed on drop.
#[derive(Debug)]
pub struct ExtractedArchive {
    dir: TempDir,
    members: BTreeMap<String, PathBuf>,
}

impl ExtractedArchive {
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Member name to extracted path.
    pub fn members(&self) -> &BTreeMap<String, PathBuf> {
        &self.members
    }

    /// Resolves every role, failing with the full list of missing roles.
    pub fn roles(&self, layout: &ArchiveLayout) -> Result<RoleMembers<'_>> {
        let mut found: BTreeMap<MemberRole, &Path> = BTreeMap::new();
        for (name, path) in &self.members {
            match layout.role_of(name) {
                Some(role) => {
                    if found.insert(role, path.as_path()).is_some() {
                        return Err(Error::ArchiveRead(format!(
                            "more than one {} member",
                            role
                        )));
                    }
                }
                None => debug!(member = %name, "ignoring archive member"),
            }
        }

        let missing: Vec<String> = MemberRole::ALL
            .iter()
            .filter(|role| !found.contains_key(role))
            .map(|role| format!("{} (`{}`)", role, layout.stem(*role)))
            .collect();
        if !missing.is_empty() {
            return Err(Error::ArchiveRead(format!(
                "archive lacks required member(s) {}; found [{}]",
                missing.join(", "),
                self.members.keys().cloned().collect::<Vec<_>>().join(", ")
            )));
        }

        Ok(RoleMembers {
            instant: found[&MemberRole::Instant],
            accumulated: found[&MemberRole::Accumulated],
            extreme: found[&MemberRole::Extreme],
        })
    }

    /// Removes the extracted content now, reporting any failure.
    pub fn close(self) -> io::Result<()> {
        self.dir.close()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ArchiveExtractor {
    layout: ArchiveLayout,
}

impl ArchiveExtractor {
    pub fn new(layout: ArchiveLayout) -> Self {
        ArchiveExtractor { layout }
    }

    pub fn layout(&self) -> &ArchiveLayout {
        &self.layout
    }

    /// Extracts every member into a fresh temporary directory.
    pub fn extract(&self, archive_path: &Path) -> Result<ExtractedArchive> {
        let dir = TempDir::new().map_err(|e| {
            Error::ArchiveRead(format!("failed to create extraction directory: {}", e))
        })?;

        let members = match ArchiveFormat::detect(archive_path)? {
            ArchiveFormat::Zip => extract_zip(archive_path, dir.path())?,
            ArchiveFormat::TarGz => extract_tar_gz(archive_path, dir.path())?,
        };
        debug!(
            archive = %archive_path.display(),
            members = members.len(),
            dir = %dir.path().display(),
            "extracted archive"
        );

        Ok(ExtractedArchive { dir, members })
    }

    /// Extracts the archive, hands the role members to `f`, and removes the
    /// extracted content before returning, whatever the outcome.
    pub fn with_members<T>(
        &self,
        archive_path: &Path,
        f: impl FnOnce(&RoleMembers<'_>) -> Result<T>,
    ) -> Result<T> {
        let extracted = self.extract(archive_path)?;
        let result = extracted.roles(&self.layout).and_then(|members| f(&members));

        let dir = extracted.dir().to_path_buf();
        if let Err(e) = extracted.close() {
            warn!(dir = %dir.display(), error = %e, "failed to remove extracted archive");
        }

        result
    }

    /// Lists member names without extracting them.
    pub fn list(&self, archive_path: &Path) -> Result<Vec<String>> {
        let file = File::open(archive_path).map_err(|e| archive_error(archive_path, e))?;

        match ArchiveFormat::detect(archive_path)? {
            ArchiveFormat::Zip => {
                let archive = ZipArchive::new(file).map_err(|e| archive_error(archive_path, e))?;
                Ok(archive.file_names().map(str::to_string).collect())
            }
            ArchiveFormat::TarGz => {
                let mut archive = Archive::new(GzDecoder::new(file));
                let mut names = Vec::new();
                for entry in archive.entries().map_err(|e| archive_error(archive_path, e))? {
                    let entry = entry.map_err(|e| archive_error(archive_path, e))?;
                    if entry.header().entry_type().is_file() {
                        let path = entry.path().map_err(|e| archive_error(archive_path, e))?;
                        names.push(path.to_string_lossy().to_string());
                    }
                }
                Ok(names)
            }
        }
    }
}

fn extract_zip(archive_path: &Path, working_dir: &Path) -> Result<BTreeMap<String, PathBuf>> {
    let file = File::open(archive_path).map_err(|e| archive_error(archive_path, e))?;
    let mut archive = ZipArchive::new(file).map_err(|e| archive_error(archive_path, e))?;
    let mut members = BTreeMap::new();

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| archive_error(archive_path, e))?;
        if entry.is_dir() {
            continue;
        }

        let name = entry.name().to_string();
        let relative = entry.enclosed_name().ok_or_else(|| {
            Error::ArchiveRead(format!("member `{}` escapes the extraction directory", name))
        })?;

        let target = working_dir.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| archive_error(&target, e))?;
        }
        let mut out = File::create(&target).map_err(|e| archive_error(&target, e))?;
        io::copy(&mut entry, &mut out).map_err(|e| archive_error(&target, e))?;

        members.insert(name, target);
    }

    Ok(members)
}

fn extract_tar_gz(archive_path: &Path, working_dir: &Path) -> Result<BTreeMap<String, PathBuf>> {
    let tar_gz = File::open(archive_path).map_err(|e| archive_error(archive_path, e))?;
    let mut archive = Archive::new(GzDecoder::new(tar_gz));
    let mut members = BTreeMap::new();

    for entry in archive
        .entries()
        .map_err(|e| archive_error(archive_path, e))?
    {
        let mut entry = entry.map_err(|e| archive_error(archive_path, e))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .map_err(|e| archive_error(archive_path, e))?
            .into_owned();
        let name = relative.to_string_lossy().to_string();
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(Error::ArchiveRead(format!(
                "member `{}` escapes the extraction directory",
                name
            )));
        }

        let unpacked = entry
            .unpack_in(working_dir)
            .map_err(|e| archive_error(archive_path, e))?;
        if !unpacked {
            return Err(Error::ArchiveRead(format!(
                "member `{}` escapes the extraction directory",
                name
            )));
        }

        members.insert(name, working_dir.join(relative));
    }

    Ok(members)
}

fn archive_error(path: &Path, e: impl fmt::Display) -> Error {
    Error::ArchiveRead(format!("{}: {}", path.display(), e))
}

// -- Tests -------------------------------------------------------------------
