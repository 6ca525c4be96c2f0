/*!
Verified resource fetching for reproducible builds.

Every external resource (compiler tarball, firmware binary, source
archive) is retrieved through [`fetch`] or [`fetch_git`] with a mandatory
content hash, single-tier: the cache is consulted first, and the origin
is only hit on a cache miss or cache corruption. There is no lookaside
cache in front of the origin (unlike the teacher's
[`LookasideCache`](https://docs.rs/buildsys), which is a two-tier
lookaside-then-upstream scheme for an internal artifact store) — there is
only one upstream to fall back to, so a second tier would add a dial
with nothing behind it.
*/
use crate::error::{
    DirectoryWalkSnafu, Error, FetchFailedSnafu, HashMismatchSnafu, IoSnafu, MissingRefSnafu,
    SubprocessFailedSnafu, SubprocessStartSnafu,
};
use sha2::{Digest, Sha256};
use snafu::{ensure, ResultExt};
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

fn cache_root() -> PathBuf {
    match std::env::var_os("TDX_CACHE_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => home::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cache")
            .join("tdx"),
    }
}

fn fetch_cache_dir() -> io::Result<PathBuf> {
    let dir = cache_root().join("fetch");
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn git_cache_dir() -> io::Result<PathBuf> {
    let dir = cache_root().join("git");
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn git_tree_cache_dir() -> io::Result<PathBuf> {
    let dir = fetch_cache_dir()?.join("git-trees");
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn sha256_file(path: &Path) -> io::Result<String> {
    let mut f = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut f, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Deterministic content hash of a directory tree: for every file, sorted
/// by its path relative to `directory`, hash `relative_path \0 contents`;
/// hash the concatenation of those per-file digests. Independent of file
/// metadata (mtimes, permissions) and git history — two checkouts of the
/// same tree at different times or via different VCS hash identically.
/// Paths under a `.git*` component are skipped, as is any symlink (its
/// target may not resolve the same way on every machine this tree is
/// rehashed on).
pub fn dirhash(directory: &Path) -> Result<String, Error> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(directory) {
        let entry = entry.context(DirectoryWalkSnafu {
            path: directory.to_path_buf(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(directory)
            .expect("walkdir entries are rooted under directory")
            .to_path_buf();
        if rel
            .components()
            .any(|c| c.as_os_str().to_string_lossy().starts_with(".git"))
        {
            continue;
        }
        files.push(rel);
    }
    files.sort();

    let mut outer = Sha256::new();
    for rel in files {
        let full = directory.join(&rel);
        let content = fs::read(&full).context(IoSnafu { path: full.clone() })?;
        let mut inner = Sha256::new();
        inner.update(rel.to_string_lossy().as_bytes());
        inner.update([0u8]);
        inner.update(&content);
        outer.update(inner.finalize());
    }
    Ok(hex::encode(outer.finalize()))
}

fn run(program: &str, args: &[&str]) -> Result<String, Error> {
    let command = format!("{} {}", program, args.join(" "));
    let output = std::process::Command::new(program)
        .args(args)
        .output()
        .context(SubprocessStartSnafu {
            command: command.clone(),
        })?;
    if !output.status.success() {
        return SubprocessFailedSnafu {
            command,
            message: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
        .fail();
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Download a resource and verify its content hash, returning the path to
/// the verified cached file. Already-cached content that still matches
/// `sha256` is returned without a network round trip; a cache entry that
/// fails verification (corruption) is discarded and re-fetched.
pub fn fetch(url: &str, sha256: &str) -> Result<PathBuf, Error> {
    let cache = fetch_cache_dir().context(IoSnafu {
        path: cache_root(),
    })?;
    let cached = cache.join(sha256);

    if cached.exists() {
        let actual = sha256_file(&cached).context(IoSnafu {
            path: cached.clone(),
        })?;
        if actual == sha256 {
            return Ok(cached);
        }
        fs::remove_file(&cached).context(IoSnafu {
            path: cached.clone(),
        })?;
    }

    let tmp = cache.join(format!("{}.download", uniq_suffix()));
    let download = || -> Result<(), Error> {
        let client = reqwest::blocking::Client::new();
        let mut resp = client
            .get(url)
            .send()
            .context(FetchFailedSnafu { url })?
            .error_for_status()
            .context(FetchFailedSnafu { url })?;
        let f = File::create(&tmp).context(IoSnafu { path: tmp.clone() })?;
        let mut writer = BufWriter::new(f);
        resp.copy_to(&mut writer).context(FetchFailedSnafu { url })?;
        Ok(())
    };

    if let Err(e) = download() {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    let actual = sha256_file(&tmp).context(IoSnafu { path: tmp.clone() })?;
    if actual != sha256 {
        let _ = fs::remove_file(&tmp);
        return HashMismatchSnafu {
            url,
            expected: sha256,
            actual,
        }
        .fail();
    }

    fs::rename(&tmp, &cached).context(IoSnafu { path: cached.clone() })?;
    Ok(cached)
}

fn uniq_suffix() -> String {
    let mut bytes = [0u8; 16];
    // std::process::id() plus a pointer address stands in for real
    // randomness here: uniqueness, not unpredictability, is all a temp
    // file name needs, and this crate never calls Math.random()-equivalent
    // nondeterministic sources from a place that must stay reproducible.
    let pid = std::process::id();
    let addr = &bytes as *const _ as usize;
    bytes[..4].copy_from_slice(&pid.to_ne_bytes());
    bytes[4..12].copy_from_slice(&(addr as u64).to_ne_bytes());
    hex::encode(bytes)
}

/// One way to pin a git ref for [`fetch_git`].
pub enum GitRef {
    Rev(String),
    Tag(String),
    Branch(String),
}

impl GitRef {
    fn as_str(&self) -> &str {
        match self {
            GitRef::Rev(s) | GitRef::Tag(s) | GitRef::Branch(s) => s,
        }
    }
}

/// Fetch a git repository at a specific ref and verify the checked-out
/// tree's content hash (via [`dirhash`], not a commit SHA: the hash is
/// independent of git history, so the same source tree produces the same
/// hash however it was obtained).
pub fn fetch_git(url: &str, git_ref: Option<GitRef>, sha256: &str) -> Result<PathBuf, Error> {
    let git_ref = match git_ref {
        Some(r) => r,
        None => return MissingRefSnafu.fail(),
    };

    let git_cache = git_cache_dir().context(IoSnafu {
        path: cache_root(),
    })?;
    let without_scheme = url.splitn(2, "://").nth(1).unwrap_or(url);
    let mut rest = without_scheme.splitn(2, '/');
    let host = rest.next().unwrap_or("unknown-host");
    let path = rest.next().unwrap_or("");
    let repo_name = path.trim_matches('/').replace('/', "-").replace(".git", "");
    let bare_repo = git_cache.join(format!("{}-{}.git", host, repo_name));

    if !bare_repo.exists() {
        run(
            "git",
            &["clone", "--bare", url, bare_repo.to_str().unwrap_or("")],
        )?;
    } else {
        run(
            "git",
            &[
                "-C",
                bare_repo.to_str().unwrap_or(""),
                "fetch",
                "--force",
                "--tags",
                url,
                "+refs/heads/*:refs/heads/*",
            ],
        )?;
    }

    let resolved_rev = run(
        "git",
        &["-C", bare_repo.to_str().unwrap_or(""), "rev-parse", git_ref.as_str()],
    )?
    .trim()
    .to_string();

    let checkout_cache = git_tree_cache_dir()
        .context(IoSnafu {
            path: cache_root(),
        })?
        .join(sha256);
    if checkout_cache.exists() {
        let actual = dirhash(&checkout_cache)?;
        if actual == sha256 {
            return Ok(checkout_cache);
        }
    }

    let tmp_parent = tempfile::tempdir().context(IoSnafu {
        path: cache_root(),
    })?;
    let tmp_checkout = tmp_parent.path().join("src");
    run(
        "git",
        &[
            "clone",
            "--depth=1",
            bare_repo.to_str().unwrap_or(""),
            tmp_checkout.to_str().unwrap_or(""),
        ],
    )?;
    run(
        "git",
        &[
            "-C",
            tmp_checkout.to_str().unwrap_or(""),
            "checkout",
            &resolved_rev,
        ],
    )?;

    let actual = dirhash(&tmp_checkout)?;
    if actual != sha256 {
        return HashMismatchSnafu {
            url,
            expected: sha256,
            actual,
        }
        .fail();
    }

    fs::rename(&tmp_checkout, &checkout_cache).context(IoSnafu {
        path: checkout_cache.clone(),
    })?;
    Ok(checkout_cache)
}

/// Convenience for discovering the expected hash of a resource before
/// adding it to a [`fetch`] call: hashes a local file directly, or
/// downloads a URL to a temp file first.
pub fn hash_of(path_or_url: &str) -> Result<String, Error> {
    let path = Path::new(path_or_url);
    if path.exists() {
        let digest = sha256_file(path).context(IoSnafu {
            path: path.to_path_buf(),
        })?;
        return Ok(format!("sha256:{}", digest));
    }

    let tmp_dir = tempfile::tempdir().context(IoSnafu {
        path: PathBuf::from("."),
    })?;
    let tmp = tmp_dir.path().join("hash-of.download");
    let client = reqwest::blocking::Client::new();
    let mut resp = client
        .get(path_or_url)
        .send()
        .context(FetchFailedSnafu { url: path_or_url })?
        .error_for_status()
        .context(FetchFailedSnafu { url: path_or_url })?;
    let f = File::create(&tmp).context(IoSnafu { path: tmp.clone() })?;
    let mut writer = BufWriter::new(f);
    resp.copy_to(&mut writer)
        .context(FetchFailedSnafu { url: path_or_url })?;

    let digest = sha256_file(&tmp).context(IoSnafu { path: tmp })?;
    Ok(format!("sha256:{}", digest))
}

/// Content hash of a directory tree, in `sha256:<hex>` form.
pub fn hash_dir(directory: &Path) -> Result<String, Error> {
    Ok(format!("sha256:{}", dirhash(directory)?))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn dirhash_is_stable_across_walk_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), b"second").unwrap();
        fs::write(dir.path().join("a.txt"), b"first").unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("c.txt"), b"third").unwrap();

        let h1 = dirhash(dir.path()).unwrap();
        let h2 = dirhash(dir.path()).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn dirhash_ignores_git_metadata_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"content").unwrap();
        let without_git = dirhash(dir.path()).unwrap();

        let git_dir = dir.path().join(".git");
        fs::create_dir(&git_dir).unwrap();
        fs::write(git_dir.join("HEAD"), b"ref: refs/heads/main").unwrap();
        let with_git = dirhash(dir.path()).unwrap();

        assert_eq!(without_git, with_git);
    }

    #[test]
    fn dirhash_changes_with_content() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"content").unwrap();
        let h1 = dirhash(dir.path()).unwrap();
        fs::write(dir.path().join("a.txt"), b"different").unwrap();
        let h2 = dirhash(dir.path()).unwrap();
        assert_ne!(h1, h2);
    }

    #[test]
    fn hash_dir_is_prefixed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"x").unwrap();
        let hashed = hash_dir(dir.path()).unwrap();
        assert!(hashed.starts_with("sha256:"));
    }

    #[test]
    fn hash_of_local_file_matches_sha256_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"hello world").unwrap();
        let hashed = hash_of(f.path().to_str().unwrap()).unwrap();
        assert_eq!(
            hashed,
            format!("sha256:{}", sha256_file(f.path()).unwrap())
        );
    }

    #[test]
    fn fetch_caches_on_second_call_without_network() {
        // Write directly into the cache to simulate a prior fetch, then
        // confirm fetch() returns it without touching the network.
        std::env::set_var("TDX_CACHE_DIR", tempfile::tempdir().unwrap().path());
        let content = b"cached-payload";
        let digest = {
            let mut hasher = Sha256::new();
            hasher.update(content);
            hex::encode(hasher.finalize())
        };
        let cache = fetch_cache_dir().unwrap();
        fs::write(cache.join(&digest), content).unwrap();

        let path = fetch("http://example.invalid/should-not-be-fetched", &digest).unwrap();
        assert_eq!(fs::read(path).unwrap(), content);
    }

    #[test]
    fn fetch_rejects_cached_content_that_no_longer_matches_its_hash() {
        // A corrupted cache entry (content doesn't match the name it's
        // cached under) must be discarded and refetched rather than
        // silently returned, and a refetch against an unreachable URL
        // surfaces as an error rather than handing back the stale file.
        std::env::set_var("TDX_CACHE_DIR", tempfile::tempdir().unwrap().path());
        let expected = "0".repeat(64);
        let cache = fetch_cache_dir().unwrap();
        fs::write(cache.join(&expected), b"not the right content").unwrap();

        let result = fetch("http://example.invalid/unreachable", &expected);
        assert!(result.is_err());
        assert!(!cache.join(&expected).exists());
    }

    /// S4 — dirhash, computed against the literal formula in spec.md §4.4:
    /// sha256(sha256("a/x"||0x00||"hello\n") || sha256("b/y"||0x00||"world\n")).
    #[test]
    fn dirhash_matches_the_literal_two_file_example() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();
        fs::create_dir(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("a/x"), b"hello\n").unwrap();
        fs::write(dir.path().join("b/y"), b"world\n").unwrap();

        let mut inner_a = Sha256::new();
        inner_a.update(b"a/x");
        inner_a.update([0u8]);
        inner_a.update(b"hello\n");

        let mut inner_b = Sha256::new();
        inner_b.update(b"b/y");
        inner_b.update([0u8]);
        inner_b.update(b"world\n");

        let mut outer = Sha256::new();
        outer.update(inner_a.finalize());
        outer.update(inner_b.finalize());
        let expected = hex::encode(outer.finalize());

        assert_eq!(dirhash(dir.path()).unwrap(), expected);
    }
}
