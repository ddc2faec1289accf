//! Canned answers for well-known career topics
//!
//! Used when the backend answers with nothing usable. Entries are checked
//! in order and the first keyword contained in the question wins, so more
//! specific keywords come before the broader ones they contain.

const TOPICS: &[(&str, &str)] = &[
    (
        "restart after break",
        "Look into returnship programs such as Tata SCIP (https://scip.tatasecondcareers.com) \
         and IBM Re-Entry, and highlight any freelance or volunteer work on your resume too!",
    ),
    (
        "career break",
        "Returning after a break? Upskill on Coursera (https://coursera.org), reconnect with \
         peers, and show how your break helped you grow. Returnship programs are a great place \
         to start!",
    ),
    (
        "resume gap",
        "Career gaps are totally okay! Be honest and highlight what you learned: volunteering, \
         courses, caregiving. Resume builders like Novoresume can help you shape your story.",
    ),
    (
        "starting out",
        "Starting your IT career? Focus on core skills like Python, Java or JavaScript. Free \
         courses on freeCodeCamp (https://www.freecodecamp.org) and Coursera are a great start, \
         and communities like Women in Tech (https://womenintech.org) keep you connected.",
    ),
    (
        "first job",
        "Landing your first job is all about practice and presence! Build small projects, \
         contribute on GitHub, and join groups like Lean In (https://leanin.org) and \
         JobsForHer (https://jobsforher.com) for support.",
    ),
    (
        "find mentor",
        "Mentors are everywhere: Lean In Circles (https://leanin.org/circles), JobsForHer, or \
         your current network. Don't hesitate to ask, many are happy to help!",
    ),
    (
        "mentorship",
        "Mentorship can guide you through tough phases. Try JobsForHer, Lean In Circles, or send \
         a kind, personal message to women leaders on LinkedIn asking for guidance.",
    ),
    (
        "negotiate salary",
        "Practice your pitch, list your contributions, and benchmark with Payscale \
         (https://payscale.com) or Glassdoor (https://glassdoor.com). You deserve fair pay!",
    ),
    (
        "negotiation",
        "Know your worth! Research on Glassdoor, rehearse your pitch, and go into salary \
         negotiations with facts, not fear.",
    ),
    (
        "promotion",
        "Track your wins, align with team goals, and have regular check-ins with your manager. \
         Being visible and proactive pays off!",
    ),
    (
        "bias at work",
        "Speak up respectfully. Keep documentation, use your company's HR process, and get \
         support from communities like SHEroes (https://sheroes.com) if needed.",
    ),
    (
        "job search",
        "Check out women-focused platforms like JobsForHer (https://jobsforher.com), \
         HerSecondInnings (https://hersecondinnings.com) and LinkedIn. Tailor your resume for \
         each role!",
    ),
    (
        "work-life balance",
        "It's okay to say no. Prioritize, communicate your boundaries, and explore flexible or \
         remote roles. Self-care is part of success.",
    ),
    (
        "skill development",
        "Build your skills on Coursera, Udemy, LinkedIn Learning, or government portals like \
         Skill India (https://www.skillindia.gov.in/).",
    ),
];

/// Canned answer for the first known topic mentioned in `question`
#[must_use]
pub fn lookup_topic(question: &str) -> Option<&'static str> {
    let lower = question.to_lowercase();
    TOPICS
        .iter()
        .find(|(keyword, _)| lower.contains(keyword))
        .map(|(_, answer)| *answer)
}
