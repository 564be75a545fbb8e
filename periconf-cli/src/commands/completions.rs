//! Shell completion generation and installation.

use {
    crate::{Cli, CliError},
    anyhow::{Context, Result},
    clap::CommandFactory,
    clap_complete::{Shell, generate},
    console::style,
    directories::BaseDirs,
    std::{
        env, fs,
        io::{self, Write as _},
        path::{Path, PathBuf},
    },
};

fn bin_name() -> String {
    Cli::command()
        .get_name()
        .to_string()
}

fn render(shell: Shell, out: &mut dyn io::Write) {
    let mut cmd = Cli::command();
    let name = bin_name();
    generate(shell, &mut cmd, name, out);
}

/// Generate shell completions to stdout.
pub(crate) fn cmd_completions(shell: Shell) {
    render(shell, &mut io::stdout());
}

/// Detect the user's current shell from environment.
pub(crate) fn detect_shell_type() -> Option<Shell> {
    if let Ok(shell_path) = env::var("SHELL") {
        return shell_from_path(&shell_path);
    }

    if cfg!(windows) && env::var("PSModulePath").is_ok() {
        return Some(Shell::PowerShell);
    }

    None
}

/// Map a shell binary path such as `/usr/bin/zsh` to its [`Shell`].
fn shell_from_path(shell_path: &str) -> Option<Shell> {
    let shell_name = Path::new(shell_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    match shell_name {
        "bash" => Some(Shell::Bash),
        "zsh" => Some(Shell::Zsh),
        "fish" => Some(Shell::Fish),
        "elvish" => Some(Shell::Elvish),
        "pwsh" | "powershell" => Some(Shell::PowerShell),
        _ => None,
    }
}

/// Directories completion scripts are installed under.
struct InstallRoots {
    home: PathBuf,
    config: PathBuf,
    data: PathBuf,
}

impl InstallRoots {
    /// XDG locations, falling back to `~/.config` and `~/.local/share`.
    fn detect() -> Result<Self> {
        let home = BaseDirs::new()
            .map(|dirs| {
                dirs.home_dir()
                    .to_path_buf()
            })
            .context("Could not determine home directory")?;
        let config = env::var_os("XDG_CONFIG_HOME").map_or_else(|| home.join(".config"), PathBuf::from);
        let data = env::var_os("XDG_DATA_HOME").map_or_else(
            || {
                home.join(".local")
                    .join("share")
            },
            PathBuf::from,
        );
        Ok(Self { home, config, data })
    }

    fn script_path(&self, shell: Shell, name: &str) -> Result<PathBuf> {
        let path = match shell {
            Shell::Bash => self
                .data
                .join("bash-completion")
                .join("completions")
                .join(name),
            Shell::Zsh => self
                .home
                .join(".zfunc")
                .join(format!("_{name}")),
            Shell::Fish => self
                .config
                .join("fish")
                .join("completions")
                .join(format!("{name}.fish")),
            Shell::Elvish => self
                .config
                .join("elvish")
                .join("lib")
                .join(format!("{name}.elv")),
            Shell::PowerShell => match env::var_os("PROFILE") {
                Some(profile) => PathBuf::from(profile)
                    .parent()
                    .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
                    .join(format!("{name}.ps1")),
                None => self
                    .config
                    .join("powershell")
                    .join("completions")
                    .join(format!("{name}.ps1")),
            },
            _ => anyhow::bail!("Unsupported shell for auto-install"),
        };
        Ok(path)
    }
}

/// Make sure `~/.zshrc` puts `~/.zfunc` on the function path.
fn ensure_zsh_fpath(home: &Path, name: &str) -> Result<()> {
    let zshrc = home.join(".zshrc");
    let fpath_line = "fpath=(~/.zfunc $fpath)";

    let present = fs::read_to_string(&zshrc).is_ok_and(|content| content.contains(fpath_line));
    if present {
        return Ok(());
    }

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&zshrc)
        .with_context(|| format!("Failed to update {}", zshrc.display()))?;
    writeln!(file, "\n# {name} completions")?;
    writeln!(file, "{fpath_line}")?;
    writeln!(file, "autoload -Uz compinit && compinit")?;
    eprintln!(
        "{} Added fpath to {}",
        style("✓")
            .green()
            .bold(),
        style(zshrc.display()).yellow()
    );
    Ok(())
}

/// Install shell completions automatically.
pub(crate) fn cmd_completions_install(shell_arg: Option<Shell>) -> Result<()> {
    let name = bin_name();
    let shell = match shell_arg.or_else(detect_shell_type) {
        Some(shell) => shell,
        None => {
            return Err(CliError::Usage(format!(
                "Could not detect your shell. Please specify it explicitly:\n  \
                 {name} completions --install bash"
            ))
            .into());
        },
    };

    let roots = InstallRoots::detect()?;
    let path = roots.script_path(shell, &name)?;

    let mut buf = Vec::new();
    render(shell, &mut buf);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(&path, &buf)
        .with_context(|| format!("Failed to write completion file: {}", path.display()))?;

    eprintln!(
        "{} Installed {} completions to {}",
        style("✓")
            .green()
            .bold(),
        style(format!("{shell:?}")).cyan(),
        style(path.display()).yellow()
    );

    match shell {
        Shell::Bash => {
            eprintln!(
                "To activate now: {}",
                style(format!("source {}", path.display())).cyan()
            );
        },
        Shell::Zsh => {
            ensure_zsh_fpath(&roots.home, &name)?;
            eprintln!("Restart your shell or run: {}", style("exec zsh").cyan());
        },
        Shell::PowerShell => {
            eprintln!("Add this to your PowerShell profile to load on startup:");
            eprintln!(
                "  {}",
                style(format!("Import-Module {}", path.display())).cyan()
            );
        },
        _ => {
            eprintln!("Completions will be loaded automatically by new shells.");
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roots() -> InstallRoots {
        InstallRoots {
            home: PathBuf::from("/home/u"),
            config: PathBuf::from("/home/u/.config"),
            data: PathBuf::from("/home/u/.local/share"),
        }
    }

    #[test]
    fn test_shell_from_path() {
        assert_eq!(shell_from_path("/bin/bash"), Some(Shell::Bash));
        assert_eq!(shell_from_path("/usr/local/bin/zsh"), Some(Shell::Zsh));
        assert_eq!(shell_from_path("/usr/bin/fish"), Some(Shell::Fish));
        assert_eq!(shell_from_path("elvish"), Some(Shell::Elvish));
        assert_eq!(shell_from_path("/opt/pwsh"), Some(Shell::PowerShell));
        assert_eq!(shell_from_path("/bin/tcsh"), None);
        assert_eq!(shell_from_path(""), None);
    }

    #[test]
    fn test_script_paths() {
        let roots = roots();
        assert_eq!(
            roots
                .script_path(Shell::Bash, "periconf")
                .unwrap(),
            Path::new("/home/u/.local/share/bash-completion/completions/periconf")
        );
        assert_eq!(
            roots
                .script_path(Shell::Zsh, "periconf")
                .unwrap(),
            Path::new("/home/u/.zfunc/_periconf")
        );
        assert_eq!(
            roots
                .script_path(Shell::Fish, "periconf")
                .unwrap(),
            Path::new("/home/u/.config/fish/completions/periconf.fish")
        );
        assert_eq!(
            roots
                .script_path(Shell::Elvish, "periconf")
                .unwrap(),
            Path::new("/home/u/.config/elvish/lib/periconf.elv")
        );
    }

    #[test]
    fn test_zsh_fpath_added_once() {
        let home = tempfile::tempdir().unwrap();
        ensure_zsh_fpath(home.path(), "periconf").unwrap();
        ensure_zsh_fpath(home.path(), "periconf").unwrap();

        let zshrc = fs::read_to_string(
            home.path()
                .join(".zshrc"),
        )
        .unwrap();
        assert_eq!(
            zshrc
                .matches("fpath=(~/.zfunc $fpath)")
                .count(),
            1
        );
    }

    #[test]
    fn test_render_mentions_subcommands() {
        for shell in [Shell::Bash, Shell::Zsh, Shell::Fish] {
            let mut buf = Vec::new();
            render(shell, &mut buf);
            let output = String::from_utf8(buf).unwrap();
            assert!(output.contains("periconf"));
            assert!(output.contains("add-label-mac"));
        }
    }
}
