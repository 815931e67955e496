use std::io::{self, BufRead, Write};
use crate::{reconciler::DesiredRecordSet, registrar::Credentials};

const AFFIRMATIVE: &str = "yes";

/// Supplies the credentials used for every registrar call of a run.
#[cfg_attr(test, mockall::automock)]
pub trait CredentialSource {
    fn credentials(&self) -> io::Result<Credentials>;
}

/// Asks the operator to approve the changes before anything is mutated.
#[cfg_attr(test, mockall::automock)]
pub trait Confirm {
    fn confirm(&self, plan: &DesiredRecordSet) -> io::Result<bool>;
}

impl CredentialSource for Credentials {
    fn credentials(&self) -> io::Result<Credentials> {
        Ok(self.clone())
    }
}

/// Interactive prompts on stdin/stdout.
#[derive(Debug, Default)]
pub struct Terminal;

impl CredentialSource for Terminal {
    fn credentials(&self) -> io::Result<Credentials> {
        println!();
        println!("⚠️  Please enter your reg.ru API credentials:");
        println!("Note: You can set a separate API password at:");
        println!("https://www.reg.ru/user/account/api_settings");
        println!();

        let stdin = io::stdin();
        let stdout = io::stdout();
        let mut input = stdin.lock();
        let mut output = stdout.lock();

        let username = prompt(&mut input, &mut output, "reg.ru username/email: ")?;
        let password = prompt(&mut input, &mut output, "reg.ru API password: ")?;

        Ok(Credentials::new(username, password))
    }
}

impl Confirm for Terminal {
    fn confirm(&self, plan: &DesiredRecordSet) -> io::Result<bool> {
        println!();
        println!("⚠️  WARNING: This will modify DNS records for {}", plan.domain);
        println!("This will:");
        println!("  1. Clear existing DNS records for {}", plan.domain);
        println!("  2. Add A record: {} → {}", plan.root_name(), plan.root_ip);
        println!("  3. Add CNAME record: {} → {}", plan.www_name(), plan.www_target);
        println!();

        let stdin = io::stdin();
        let stdout = io::stdout();
        let answer = prompt(
            &mut stdin.lock(),
            &mut stdout.lock(),
            "Do you want to continue? (yes/no): ",
        )?;

        Ok(is_affirmative(&answer))
    }
}

/// Writes `message` and reads one trimmed line. End of input is an error.
fn prompt<R: BufRead, W: Write>(input: &mut R, output: &mut W, message: &str) -> io::Result<String> {
    write!(output, "{}", message)?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "no input from operator"));
    }

    Ok(line.trim().to_owned())
}

fn is_affirmative(answer: &str) -> bool {
    answer.trim().to_lowercase() == AFFIRMATIVE
}
