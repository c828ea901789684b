use std::io::BufRead;

use tessera_core::passwords::hash_password;

/// Run the `hash-password` command: print an argon2id PHC string.
pub fn run(password: Option<String>) -> anyhow::Result<()> {
    let password = match password {
        Some(password) => password,
        None => read_password(std::io::stdin().lock())?,
    };
    println!("{}", hash(&password)?);
    Ok(())
}

fn read_password(mut input: impl BufRead) -> anyhow::Result<String> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn hash(password: &str) -> anyhow::Result<String> {
    if password.is_empty() {
        anyhow::bail!("password must not be empty");
    }
    Ok(hash_password(password)?)
}
